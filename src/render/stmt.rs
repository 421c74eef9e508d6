//! Statement handlers: returns, return-terminated `if` chains, import
//! aliases and docstrings.

use super::walker::SourceWalker;
use crate::error::{DeparseError, Result};
use crate::lang::{Node, Tree, Value};

const TAB_SIZE: usize = 8;

/// Stands in for a backslash while the quoting style is decided. Tabs are
/// expanded before it is used, so it cannot collide with content.
const BACKSLASH: char = '\t';

/// `return None`, spelled either way the grammar produces it.
pub(crate) fn is_return_none(node: &Node) -> bool {
    node.get(0)
        .is_some_and(|ret| ret.is("return_expr") && ret.get(0).is_some_and(Tree::is_none_const))
}

/// A statement wrapping `ifstmt` whose body is only return statements.
fn is_if_return(stmt: &Tree) -> bool {
    let body_is_returns = |path: &[isize]| stmt.path(path).is_some_and(|s| s.is("return_if_stmts"));
    stmt.get(0).is_some_and(|s| s.is("ifstmt"))
        && (body_is_returns(&[0, 1]) || body_is_returns(&[0, 1, 0]))
}

/// The same statement with its `ifstmt` rendered as `elif`.
fn as_elif(stmt: &Tree) -> Tree {
    match stmt {
        Tree::Node(n) => Tree::Node(n.with_kind_at(&[0], "elifstmt")),
        other => other.clone(),
    }
}

fn expand_tabs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut column = 0;
    for c in text.chars() {
        match c {
            '\t' => {
                let pad = TAB_SIZE - column % TAB_SIZE;
                out.extend(std::iter::repeat_n(' ', pad));
                column += pad;
            }
            '\n' | '\r' => {
                out.push(c);
                column = 0;
            }
            _ => {
                out.push(c);
                column += 1;
            }
        }
    }
    out
}

/// Source text of a docstring literal, quotes included.
///
/// Line breaks stay literal. Triple double quotes are used unless the
/// content holds a `"` and no `'''`. Content whose only escapes are
/// backslashes becomes a raw string.
pub fn docstring_literal(doc: &str) -> String {
    let quote = if doc.contains('"') && !doc.contains("'''") {
        "'''"
    } else {
        r#"""""#
    };

    let mut body = String::with_capacity(doc.len());
    let expanded = expand_tabs(doc);
    let mut chars = expanded.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => body.push(BACKSLASH),
            '\r' => {
                chars.next_if_eq(&'\n');
                body.push('\n');
            }
            '\n' => body.push('\n'),
            c if (c as u32) < 0x20 || c == '\x7f' => body.push_str(&format!("\\x{:02x}", c as u32)),
            c => body.push(c),
        }
    }

    let chars: Vec<char> = body.chars().collect();
    let raw = body.contains(BACKSLASH)
        && !body.contains('\\')
        && chars.len() >= 2
        && chars[chars.len() - 1] != BACKSLASH
        && (chars[chars.len() - 1] != '"' || chars[chars.len() - 2] == BACKSLASH);

    let mut literal = String::with_capacity(body.len() + 8);
    if raw {
        literal.push('r');
        literal.push_str(quote);
        literal.push_str(&body.replace(BACKSLASH, "\\"));
    } else {
        let quote_char = if quote == "'''" { '\'' } else { '"' };
        if body.ends_with(quote_char) {
            body.pop();
            body.push('\\');
            body.push(quote_char);
        }
        let body = body
            .replace(quote, &format!("\\{}", quote))
            .replace(BACKSLASH, "\\\\");
        literal.push_str(quote);
        literal.push_str(&body);
    }
    literal.push_str(quote);
    literal
}

impl SourceWalker<'_> {
    /// Statement-level `return`. Inside a lambda body only the value is
    /// written.
    pub(crate) fn n_return(&mut self, node: &Node) -> Result<()> {
        let value = node
            .get(0)
            .ok_or_else(|| DeparseError::template(&node.kind, "a return value", "no children"))?;
        if self.state.is_lambda() || value.is_any(&["pop_return", "popb_return", "pop_ex_return"]) {
            return self.preorder(value);
        }
        self.write_indent();
        self.write("return");
        // a generator may not `return None` explicitly
        if self.opts.return_none || !is_return_none(node) {
            self.write(" ");
            self.preorder(value)?;
        }
        self.println("");
        Ok(())
    }

    pub(crate) fn n_return_expr_lambda(&mut self, node: &Node) -> Result<()> {
        match node.get(0) {
            Some(value) => self.preorder(value),
            None => Err(DeparseError::template(&node.kind, "a lambda value", "no children")),
        }
    }

    /// `if` whose else branch is a run of `if ... return` statements: the
    /// run is folded into `elif` clauses when every clause returns.
    pub(crate) fn n_ifelsestmtr(&mut self, node: &Node) -> Result<()> {
        let (kind, returns) = if node.get(2).is_some_and(|t| t.is("COME_FROM")) {
            ("ifelsestmtr2", node.get(3))
        } else {
            ("ifelsestmtr", node.get(2))
        };
        let Some(returns) = returns.filter(|r| r.len() == 2) else {
            return self.default_as(node, kind);
        };
        let stmts = returns.get(0).map(Tree::children).unwrap_or_default();
        let leads = stmts.first().is_some_and(is_if_return);
        let trails = stmts.last().is_some_and(is_if_return);
        if !leads && !trails {
            return self.default_as(node, kind);
        }

        self.if_head("if ", node)?;

        let if_ret_at_end = stmts.len() >= 3 && trails;
        let mut past_else = false;
        let mut prev_is_if_ret = true;
        for stmt in stmts {
            if is_if_return(stmt) {
                if prev_is_if_ret {
                    self.preorder(&as_elif(stmt))?;
                } else {
                    self.preorder(stmt)?;
                }
                prev_is_if_ret = true;
                continue;
            }
            prev_is_if_ret = false;
            if !past_else && !if_ret_at_end {
                self.else_head();
                past_else = true;
            }
            self.preorder(stmt)?;
        }
        if !past_else || if_ret_at_end {
            self.else_head();
        }
        self.preorder(child_or_err(node, returns, 1)?)?;
        self.indent_less();
        Ok(())
    }

    pub(crate) fn n_elifelsestmtr(&mut self, node: &Node) -> Result<()> {
        let returns = if node.get(2).is_some_and(|t| t.is("COME_FROM")) {
            node.get(3)
        } else {
            node.get(2)
        };
        let Some(returns) = returns.filter(|r| r.len() == 2) else {
            return self.default(node);
        };
        let stmts = returns.get(0).map(Tree::children).unwrap_or_default();
        if !stmts.iter().all(is_if_return) {
            return self.default(node);
        }

        self.if_head("elif ", node)?;
        for stmt in stmts {
            self.preorder(&as_elif(stmt))?;
        }
        self.else_head();
        self.preorder(child_or_err(node, returns, 1)?)?;
        self.indent_less();
        Ok(())
    }

    /// `if cond:` and the then-branch at one level deeper.
    fn if_head(&mut self, keyword: &str, node: &Node) -> Result<()> {
        let (Some(cond), Some(body)) = (node.get(0), node.get(1)) else {
            return Err(DeparseError::template(
                &node.kind,
                "a condition and a body",
                "fewer children",
            ));
        };
        self.write_indent();
        self.write(keyword);
        self.preorder(cond)?;
        self.println(":");
        self.indent_more();
        let result = self.preorder(body);
        self.indent_less();
        result
    }

    /// `else:`, leaving the indentation one level deeper.
    fn else_head(&mut self) {
        let line = format!("{}else:", self.state.indent());
        self.println(&line);
        self.indent_more();
    }

    /// `import a.b` binds `a`, so no alias is written when the bound name is
    /// the first component.
    pub(crate) fn n_alias(&mut self, node: &Node) -> Result<()> {
        let imported = node.get(0).and_then(Tree::as_token);
        let bound = node.get(-1).and_then(|s| s.get(-1)).and_then(Tree::as_token);
        let (Some(imported), Some(bound)) = (imported, bound) else {
            return Err(DeparseError::template(
                &node.kind,
                "IMPORT_NAME ... store",
                "a malformed alias",
            ));
        };
        let (iname, sname) = (&imported.pattr, &bound.pattr);
        if iname == sname || iname.starts_with(&format!("{}.", sname)) {
            self.write(iname);
        } else {
            let text = format!("{} as {}", iname, sname);
            self.write(&text);
        }
        Ok(())
    }

    pub(crate) fn n_docstring(&mut self, node: &Node) -> Result<()> {
        let Some(token) = node.get(0).and_then(Tree::as_token) else {
            return Ok(());
        };
        let doc = match &token.attr {
            Value::Str(s) => s.as_str(),
            // tagged as a docstring but not a string
            Value::None if !token.pattr.is_empty() => token.pattr.as_str(),
            _ => return Ok(()),
        };
        self.write_docstring(doc);
        Ok(())
    }

    pub(crate) fn write_docstring(&mut self, doc: &str) {
        let line = format!("{}{}", self.state.indent(), docstring_literal(doc));
        self.println(&line);
    }
}

fn child_or_err<'t>(node: &Node, tree: &'t Tree, index: isize) -> Result<&'t Tree> {
    tree.get(index).ok_or_else(|| {
        DeparseError::template(&node.kind, format!("child {} of {}", index, tree.kind()), "none")
    })
}
