//! Class definitions.

use super::func::code_of;
use super::walker::SourceWalker;
use crate::error::{DeparseError, Result};
use crate::lang::{CodeObject, Node, Tree, Value};
use crate::normalize;

const ARG_PREC: i32 = 29;

/// `stmt`/`sstmt` wrappers around one statement.
fn statement_core(stmt: &Tree) -> &Tree {
    stmt.unwrap_single(&["sstmt", "stmt"])
}

/// `assign(expr(<value>), store(STORE_NAME <target>))` with a value
/// terminal of kind `value_kind`.
fn is_name_assign(stmt: &Tree, value_kind: &str, target: &str) -> bool {
    let core = statement_core(stmt);
    core.is("assign")
        && core
            .get(0)
            .map(|v| v.unwrap_single(&["expr"]))
            .is_some_and(|v| v.is(value_kind))
        && core
            .path(&[1, 0])
            .and_then(Tree::as_token)
            .is_some_and(|t| t.is("STORE_NAME") && t.pattr == target)
}

/// `__module__ = __name__`, emitted by the compiler at the top of every class
/// body.
fn is_module_bootstrap(stmt: &Tree) -> bool {
    is_name_assign(stmt, "LOAD_NAME", "__module__")
        && statement_core(stmt)
            .path(&[0, 0])
            .and_then(Tree::as_token)
            .is_some_and(|t| t.pattr == "__name__")
}

fn is_qualname_bootstrap(stmt: &Tree) -> bool {
    is_name_assign(stmt, "LOAD_STR", "__qualname__")
}

/// The pieces of a `__build_class__` call.
struct ClassParts<'t> {
    code: &'t CodeObject,
    bases: Vec<&'t Tree>,
    keywords: Vec<(String, &'t Tree)>,
}

fn class_parts(build_class: &Node) -> Result<ClassParts<'_>> {
    let func_at = build_class
        .children
        .iter()
        .position(|c| c.is("mkfunc") || c.attr().and_then(Value::as_code).is_some())
        .ok_or_else(|| DeparseError::template(&build_class.kind, "a class body function", "none"))?;
    let code = match &build_class.children[func_at] {
        Tree::Node(mkfunc) => code_of(mkfunc),
        Tree::Token(t) => t.attr.as_code(),
    }
    .ok_or_else(|| DeparseError::template(&build_class.kind, "a class body code object", "none"))?;

    let mut args: Vec<&Tree> = build_class.children[func_at + 1..].iter().collect();
    let call = args.last().filter(|c| c.kind().starts_with("CALL_")).map(|c| c.kind().to_string());
    if call.is_some() {
        args.pop();
    }
    let mut keyword_names: Vec<String> = Vec::new();
    if call.as_deref().is_some_and(|k| k.starts_with("CALL_FUNCTION_KW")) {
        if let Some(names) = args.pop().and_then(Tree::attr).and_then(Value::as_tuple) {
            keyword_names = names.iter().map(Value::to_string).collect();
        }
    }
    // the class name string
    if !args.is_empty() {
        args.remove(0);
    }

    // older construction: the bases arrive as one tuple
    if let [only] = args.as_slice() {
        let tuple = only.unwrap_single(&["expr"]);
        if tuple.is("tuple") {
            let bases = tuple
                .children()
                .split_last()
                .map_or(Vec::new(), |(_, rest)| rest.iter().collect());
            return Ok(ClassParts { code, bases, keywords: Vec::new() });
        }
    }

    let positional = args.len().saturating_sub(keyword_names.len());
    let keywords = keyword_names.into_iter().zip(args[positional..].iter().copied()).collect();
    args.truncate(positional);
    Ok(ClassParts { code, bases: args, keywords })
}

impl SourceWalker<'_> {
    pub(crate) fn n_classdef(&mut self, node: &Node) -> Result<()> {
        let decorated = node.is("classdefdeco2");
        let build_class = if decorated {
            node
        } else {
            node.get(0)
                .and_then(Tree::as_node)
                .ok_or_else(|| DeparseError::template(&node.kind, "build_class", "none"))?
        };
        let parts = class_parts(build_class)?;

        let mut header = format!("{}class {}", self.state.indent(), parts.code.name);
        let mut args = Vec::new();
        for base in &parts.bases {
            args.push(self.with_prec(ARG_PREC, |w| w.traverse(base, Some(""), false))?);
        }
        for (name, value) in &parts.keywords {
            let value = self.with_prec(ARG_PREC, |w| w.traverse(value, Some(""), false))?;
            args.push(format!("{}={}", name, value));
        }
        if !args.is_empty() {
            header.push('(');
            header.push_str(&args.join(", "));
            header.push(')');
        }
        header.push(':');

        self.write(if decorated { "\n" } else { "\n\n" });
        self.println(&header);

        let indent = format!("{}{}", self.state.indent(), self.opts.indent);
        let tree = self.build_nested(parts.code, false)?;
        self.state.enter(indent, false);
        let result = self.class_body(parts.code, tree);
        let body = self.state.leave();
        result?;
        self.write(&body);

        if self.state.depth() > 0 {
            self.write("\n\n");
        } else {
            self.write("\n\n\n");
        }
        Ok(())
    }

    /// Docstring, declarations, then the remaining statements, without the
    /// compiler's `__module__`/`__qualname__` bookkeeping.
    fn class_body(&mut self, code: &CodeObject, tree: Node) -> Result<()> {
        let hide = self.opts.hide_internal;
        let mut docstring = None;
        let mut stmts = Vec::with_capacity(tree.children.len());
        let mut leading = true;
        for stmt in tree.children {
            if leading {
                if statement_core(&stmt).is("docstring") && docstring.is_none() {
                    docstring = Some(stmt);
                    continue;
                }
                if is_module_bootstrap(&stmt) || is_qualname_bootstrap(&stmt) {
                    if !hide {
                        stmts.push(stmt);
                    }
                    continue;
                }
                leading = false;
            }
            stmts.push(stmt);
        }

        if let Some(doc) = &docstring {
            self.preorder(doc)?;
        }
        let body = Node::new(tree.kind, stmts);
        let (globals, nonlocals) = normalize::find_globals_and_nonlocals(&body, code);
        self.declarations(&globals, &nonlocals);
        if body.is_empty() && docstring.is_some() {
            return Ok(());
        }
        self.gen_source(&body, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Token;
    use crate::options::DeparseOptions;
    use crate::parse::ReplayParser;

    fn tok(kind: &str) -> Tree {
        Tree::Token(Token::new(kind, 0))
    }

    fn name(kind: &str, n: &str) -> Tree {
        Tree::Token(Token::name(kind, n, 0))
    }

    fn string(s: &str) -> Tree {
        Tree::Token(Token::constant("LOAD_STR", Value::Str(s.into()), 0))
    }

    fn node(kind: &str, children: Vec<Tree>) -> Tree {
        Tree::node(kind, children)
    }

    fn var(n: &str) -> Tree {
        node("expr", vec![name("LOAD_NAME", n)])
    }

    fn assign(value: Tree, target: &str) -> Tree {
        node(
            "sstmt",
            vec![node(
                "assign",
                vec![node("expr", vec![value]), node("store", vec![name("STORE_NAME", target)])],
            )],
        )
    }

    fn class_body() -> Node {
        Node::new(
            "stmts",
            vec![
                assign(name("LOAD_NAME", "__name__"), "__module__"),
                assign(string("Point"), "__qualname__"),
                node("sstmt", vec![node("docstring", vec![string("A point.")])]),
                assign(Tree::Token(Token::constant("LOAD_CONST", Value::Int(0), 0)), "x"),
            ],
        )
    }

    fn classdef(bases: Vec<Tree>, call: Tree) -> Tree {
        let code = CodeObject::new("Point")
            .with_tokens(vec![Token::new("LOAD_NAME", 0), Token::new("RETURN_VALUE", 2)]);
        let mkfunc = node(
            "mkfunc",
            vec![
                Tree::Token(Token::constant("LOAD_CODE", Value::Code(Box::new(code)), 0)),
                string("Point"),
                Tree::Token(Token::constant("MAKE_FUNCTION_0", Value::Int(0), 0)),
            ],
        );
        let mut children =
            vec![tok("LOAD_BUILD_CLASS"), mkfunc, node("expr", vec![string("Point")])];
        children.extend(bases);
        children.push(call);
        node(
            "classdef",
            vec![node("build_class", children), node("store", vec![name("STORE_NAME", "Point")])],
        )
    }

    fn render(tree: &Tree, opts: DeparseOptions) -> String {
        let mut parser = ReplayParser::default().with_tree("Point", class_body());
        let mut walker = SourceWalker::new(&mut parser, opts).unwrap();
        walker.preorder(tree).unwrap();
        walker.into_text()
    }

    #[test]
    fn test_class_with_keyword_base() {
        let tree = classdef(
            vec![
                var("Base"),
                var("Meta"),
                Tree::Token(Token::constant(
                    "LOAD_CONST",
                    Value::Tuple(vec![Value::Str("metaclass".into())]),
                    0,
                )),
            ],
            tok("CALL_FUNCTION_KW_4"),
        );
        let text = render(&tree, DeparseOptions::default());
        assert!(
            text.contains(
                "class Point(Base, metaclass=Meta):\n    \"\"\"A point.\"\"\"\n    x = 0\n"
            ),
            "{:?}",
            text
        );
        assert!(!text.contains("__module__"));
        assert!(!text.contains("__qualname__"));
    }

    #[test]
    fn test_class_without_bases() {
        let tree = classdef(vec![], tok("CALL_FUNCTION_2"));
        let text = render(&tree, DeparseOptions::default());
        assert!(text.contains("class Point:\n"), "{:?}", text);
    }

    #[test]
    fn test_bootstrap_kept_when_not_hidden() {
        let tree = classdef(vec![], tok("CALL_FUNCTION_2"));
        let text = render(&tree, DeparseOptions::default().with_hide_internal(false));
        assert!(
            text.contains("    \"\"\"A point.\"\"\"\n    __module__ = __name__\n"),
            "{:?}",
            text
        );
        assert!(text.contains("__qualname__ = 'Point'"));
    }
}