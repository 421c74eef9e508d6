//! Format templates: a compact per-kind recipe of literal text and child
//! markers, compiled once into a list of [`Piece`]s.
//!
//! Markers:
//!
//! | marker | meaning |
//! |---|---|
//! | `%c` | render a child (`Arg::Child` or `Arg::Expect`) |
//! | `%p` | render a child under a precedence (`Arg::Prec`, `Arg::ExpectPrec`) |
//! | `%C` | render a child range with a separator (`Arg::Join`) |
//! | `%D` | like `%C` but skips childless nodes (`Arg::Join`) |
//! | `%P` | like `%C` under a precedence (`Arg::JoinPrec`) |
//! | `%,` | trailing comma for one-element unpacking |
//! | `%\|` | current indentation |
//! | `%+` / `%-` | indent / dedent |
//! | `%{pattr}` | operand of the current terminal (also `attr`, `kind`, `pattr_words`) |
//! | `%[N]` | prefix: apply the following marker to child `N` |
//! | `%{%c}` | apply a nested marker (takes the next argument) |
//! | `%%` | literal percent |

use super::walker::SourceWalker;
use crate::error::{DeparseError, Result, TemplateError};
use crate::lang::{Node, Token, Tree, Value};

/// Upper bound for open-ended child ranges.
pub const MAXINT: isize = isize::MAX;

/// Argument bound to one child marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg {
    Child(isize),
    /// Child that must be of one of the listed kinds.
    Expect(isize, &'static [&'static str]),
    Prec(isize, i32),
    ExpectPrec(isize, &'static [&'static str], i32),
    /// Half-open child range `[low, high)` and separator.
    Join(isize, isize, &'static str),
    JoinPrec(isize, isize, &'static str, i32),
}

/// Value interpolated by `%{...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expr {
    Pattr,
    /// `pattr` with dashes read as spaces (`not-in` becomes `not in`).
    PattrWords,
    /// Raw operand; strings unquoted.
    Attr,
    Kind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    Text(String),
    Child {
        walk: Option<isize>,
        index: isize,
        expect: Option<&'static [&'static str]>,
        prec: Option<i32>,
    },
    Join {
        walk: Option<isize>,
        low: isize,
        high: isize,
        sep: &'static str,
        prec: Option<i32>,
        skip_empty: bool,
    },
    TrailingComma { walk: Option<isize> },
    Indent,
    IndentMore,
    IndentLess,
    Eval { walk: Option<isize>, expr: Expr },
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub pieces: Vec<Piece>,
}

impl Template {
    /// Compiles `fmt` against `args`, checking that every child marker gets
    /// an argument of the right shape and that no argument is left over.
    pub fn compile(key: &str, fmt: &str, args: &[Arg]) -> std::result::Result<Self, TemplateError> {
        let mut compiler = Compiler {
            key,
            args,
            used: 0,
            pieces: Vec::new(),
            text: String::new(),
        };
        compiler.run(fmt)?;
        if compiler.used != args.len() {
            return Err(TemplateError::ArgCount {
                key: key.to_string(),
                used: compiler.used,
                given: args.len(),
            });
        }
        Ok(Template {
            pieces: compiler.pieces,
        })
    }

    /// A template that only writes literal text.
    pub fn literal(text: &str) -> Self {
        Template {
            pieces: vec![Piece::Text(text.to_string())],
        }
    }
}

struct Compiler<'a> {
    key: &'a str,
    args: &'a [Arg],
    used: usize,
    pieces: Vec<Piece>,
    text: String,
}

impl Compiler<'_> {
    fn run(&mut self, fmt: &str) -> std::result::Result<(), TemplateError> {
        let mut chars = fmt.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                self.text.push(c);
                continue;
            }

            let mut marker = chars.next().ok_or_else(|| self.truncated())?;
            let mut walk = None;
            if marker == '[' {
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(d) if d.is_ascii_digit() || d == '-' => digits.push(d),
                        Some(other) => return Err(self.unknown(other)),
                        None => return Err(self.truncated()),
                    }
                }
                walk = Some(digits.parse::<isize>().map_err(|_| self.truncated())?);
                marker = chars.next().ok_or_else(|| self.truncated())?;
            }

            match marker {
                '%' => self.text.push('%'),
                '{' => {
                    let mut expr = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => expr.push(ch),
                            None => return Err(self.truncated()),
                        }
                    }
                    self.flush();
                    self.expr(walk, &expr)?;
                }
                other => {
                    self.flush();
                    self.marker(walk, other)?;
                }
            }
        }
        self.flush();
        Ok(())
    }

    fn flush(&mut self) {
        if !self.text.is_empty() {
            self.pieces.push(Piece::Text(std::mem::take(&mut self.text)));
        }
    }

    fn next_arg(&mut self) -> std::result::Result<Arg, TemplateError> {
        let arg = self.args.get(self.used).copied();
        self.used += 1;
        arg.ok_or_else(|| TemplateError::ArgCount {
            key: self.key.to_string(),
            used: self.used,
            given: self.args.len(),
        })
    }

    fn marker(
        &mut self,
        walk: Option<isize>,
        marker: char,
    ) -> std::result::Result<(), TemplateError> {
        let piece = match marker {
            ',' => Piece::TrailingComma { walk },
            '|' => Piece::Indent,
            '+' => Piece::IndentMore,
            '-' => Piece::IndentLess,
            'c' | 'p' | 'C' | 'D' | 'P' => {
                let index = self.used;
                let arg = self.next_arg()?;
                self.child_piece(walk, marker, arg, index)?
            }
            other => return Err(self.unknown(other)),
        };
        self.pieces.push(piece);
        Ok(())
    }

    fn child_piece(
        &self,
        walk: Option<isize>,
        marker: char,
        arg: Arg,
        index: usize,
    ) -> std::result::Result<Piece, TemplateError> {
        let piece = match (marker, arg) {
            ('c', Arg::Child(i)) => Piece::Child {
                walk,
                index: i,
                expect: None,
                prec: None,
            },
            ('c', Arg::Expect(i, kinds)) => Piece::Child {
                walk,
                index: i,
                expect: Some(kinds),
                prec: None,
            },
            ('p', Arg::Prec(i, p)) => Piece::Child {
                walk,
                index: i,
                expect: None,
                prec: Some(p),
            },
            ('p', Arg::ExpectPrec(i, kinds, p)) => Piece::Child {
                walk,
                index: i,
                expect: Some(kinds),
                prec: Some(p),
            },
            ('C' | 'D', Arg::Join(low, high, sep)) => Piece::Join {
                walk,
                low,
                high,
                sep,
                prec: None,
                skip_empty: marker == 'D',
            },
            ('P', Arg::JoinPrec(low, high, sep, p)) => Piece::Join {
                walk,
                low,
                high,
                sep,
                prec: Some(p),
                skip_empty: false,
            },
            _ => {
                return Err(TemplateError::ArgKind {
                    key: self.key.to_string(),
                    marker,
                    index,
                });
            }
        };
        Ok(piece)
    }

    fn expr(&mut self, walk: Option<isize>, expr: &str) -> std::result::Result<(), TemplateError> {
        if let Some(inner) = expr.strip_prefix('%') {
            let mut markers = inner.chars();
            let (Some(marker), None) = (markers.next(), markers.next()) else {
                return Err(self.unknown_expr(expr));
            };
            return self.marker(walk, marker);
        }
        let expr = match expr {
            "pattr" => Expr::Pattr,
            "pattr_words" => Expr::PattrWords,
            "attr" => Expr::Attr,
            "kind" => Expr::Kind,
            _ => return Err(self.unknown_expr(expr)),
        };
        self.pieces.push(Piece::Eval { walk, expr });
        Ok(())
    }

    fn truncated(&self) -> TemplateError {
        TemplateError::Truncated {
            key: self.key.to_string(),
        }
    }

    fn unknown(&self, marker: char) -> TemplateError {
        TemplateError::UnknownMarker {
            key: self.key.to_string(),
            marker,
        }
    }

    fn unknown_expr(&self, expr: &str) -> TemplateError {
        TemplateError::UnknownExpr {
            key: self.key.to_string(),
            expr: expr.to_string(),
        }
    }
}

/// Python-style slice bounds for `[low:high]` over `len` items.
pub fn slice_bounds(len: usize, low: isize, high: isize) -> (usize, usize) {
    let clamp = |i: isize| -> usize {
        if i < 0 {
            (len as isize + i).max(0) as usize
        } else {
            (i as usize).min(len)
        }
    };
    let (lo, hi) = (clamp(low), clamp(high));
    (lo, hi.max(lo))
}

/// What a template piece is applied to: the rendered node itself or a
/// descendant reached through `%[N]`.
#[derive(Clone, Copy)]
pub(crate) enum Cursor<'t> {
    Node(&'t Node),
    Tree(&'t Tree),
    Token(&'t Token),
}

impl<'t> Cursor<'t> {
    fn kind(&self) -> &'t str {
        match self {
            Cursor::Node(n) => &n.kind,
            Cursor::Tree(t) => t.kind(),
            Cursor::Token(t) => &t.kind,
        }
    }

    fn children(&self) -> &'t [Tree] {
        match self {
            Cursor::Node(n) => &n.children,
            Cursor::Tree(t) => t.children(),
            Cursor::Token(_) => &[],
        }
    }

    fn get(&self, index: isize) -> Option<&'t Tree> {
        match self {
            Cursor::Node(n) => n.get(index),
            Cursor::Tree(t) => t.get(index),
            Cursor::Token(_) => None,
        }
    }

    fn token(&self) -> Option<&'t Token> {
        match self {
            Cursor::Node(_) => None,
            Cursor::Tree(t) => t.as_token(),
            Cursor::Token(t) => Some(t),
        }
    }
}

impl SourceWalker<'_> {
    /// Interprets `template` against `node`. `kind` is the kind the node is
    /// being rendered as, which differs from `node.kind` after a relabel.
    pub(crate) fn template_engine(
        &mut self,
        template: &Template,
        node: &Node,
        kind: &str,
    ) -> Result<()> {
        self.run_template(template, Cursor::Node(node), kind)
    }

    /// Interprets a terminal's template (`%{pattr}` and friends).
    pub(crate) fn token_template(&mut self, template: &Template, token: &Token) -> Result<()> {
        self.run_template(template, Cursor::Token(token), &token.kind)
    }

    fn run_template(&mut self, template: &Template, root: Cursor<'_>, kind: &str) -> Result<()> {
        for piece in &template.pieces {
            match piece {
                Piece::Text(text) => self.write(text),
                Piece::IndentMore => {
                    self.state.line_number += 1;
                    self.indent_more();
                }
                Piece::IndentLess => {
                    self.state.line_number += 1;
                    self.indent_less();
                }
                Piece::Indent => {
                    self.state.line_number += 1;
                    self.write_indent();
                }
                Piece::TrailingComma { walk } => {
                    let cursor = descend(root, *walk, kind)?;
                    let cursor_kind = if walk.is_some() { cursor.kind() } else { kind };
                    let single = cursor
                        .get(0)
                        .and_then(Tree::attr)
                        .is_some_and(|attr| *attr == Value::Int(1));
                    if matches!(cursor_kind, "unpack" | "unpack_w_parens") && single {
                        self.write(",");
                    }
                }
                Piece::Child {
                    walk,
                    index,
                    expect,
                    prec,
                } => {
                    let cursor = descend(root, *walk, kind)?;
                    let child = cursor.get(*index).ok_or_else(|| {
                        DeparseError::template(
                            kind,
                            format!("child {} of '{}'", index, cursor.kind()),
                            format!("only {} children", cursor.children().len()),
                        )
                    })?;
                    if let Some(kinds) = expect {
                        if !child.is_any(kinds) {
                            return Err(DeparseError::template(
                                kind,
                                format!("child {} of kind {}", index, kinds.join(" or ")),
                                child.kind(),
                            ));
                        }
                    }
                    match prec {
                        Some(p) => self.with_prec(*p, |w| w.preorder(child))?,
                        None => self.preorder(child)?,
                    }
                }
                Piece::Join {
                    walk,
                    low,
                    high,
                    sep,
                    prec,
                    skip_empty,
                } => {
                    let cursor = descend(root, *walk, kind)?;
                    let children = cursor.children();
                    let (lo, hi) = slice_bounds(children.len(), *low, *high);
                    let items = &children[lo..hi];
                    let render = |w: &mut Self| -> Result<()> {
                        let mut remaining = items.len();
                        for child in items {
                            remaining -= 1;
                            if *skip_empty && child.as_node().is_some_and(Node::is_empty) {
                                continue;
                            }
                            w.preorder(child)?;
                            if remaining > 0 {
                                w.write(sep);
                            }
                        }
                        Ok(())
                    };
                    match prec {
                        Some(p) => self.with_prec(*p, render)?,
                        None => render(self)?,
                    }
                }
                Piece::Eval { walk, expr } => {
                    let cursor = descend(root, *walk, kind)?;
                    let text = eval(cursor, *expr, kind)?;
                    self.write(&text);
                }
            }
        }
        Ok(())
    }
}

fn descend<'t>(root: Cursor<'t>, walk: Option<isize>, kind: &str) -> Result<Cursor<'t>> {
    match walk {
        None => Ok(root),
        Some(i) => root.get(i).map(Cursor::Tree).ok_or_else(|| {
            DeparseError::template(
                kind,
                format!("child {} to descend into", i),
                format!("only {} children", root.children().len()),
            )
        }),
    }
}

fn eval(cursor: Cursor<'_>, expr: Expr, kind: &str) -> Result<String> {
    if expr == Expr::Kind {
        return Ok(cursor.kind().to_string());
    }
    let token = cursor.token().ok_or_else(|| {
        DeparseError::template(kind, "a terminal to interpolate", cursor.kind())
    })?;
    Ok(match expr {
        Expr::Pattr => token.pattr.clone(),
        Expr::PattrWords => token.pattr.replace('-', " "),
        Expr::Attr => token.attr.to_string(),
        Expr::Kind => token.kind.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_pieces() {
        let t = Template::compile(
            "ifstmt",
            "%|if %c:\n%+%c%-",
            &[Arg::Child(0), Arg::Expect(1, &["stmts"])],
        )
        .unwrap();
        assert_eq!(
            t.pieces,
            vec![
                Piece::Indent,
                Piece::Text("if ".into()),
                Piece::Child {
                    walk: None,
                    index: 0,
                    expect: None,
                    prec: None
                },
                Piece::Text(":\n".into()),
                Piece::IndentMore,
                Piece::Child {
                    walk: None,
                    index: 1,
                    expect: Some(&["stmts"][..]),
                    prec: None
                },
                Piece::IndentLess,
            ]
        );
    }

    #[test]
    fn test_compile_walk_and_eval() {
        let t = Template::compile("attribute", "%c.%[1]{pattr}", &[Arg::Child(0)]).unwrap();
        assert_eq!(
            t.pieces[2],
            Piece::Eval {
                walk: Some(1),
                expr: Expr::Pattr
            }
        );
        let t = Template::compile("x", "%[-1]{%c}", &[Arg::Child(0)]).unwrap();
        assert!(matches!(t.pieces[0], Piece::Child { walk: Some(-1), .. }));
    }

    #[test]
    fn test_compile_percent_literal() {
        let t = Template::compile("mod", "%%", &[]).unwrap();
        assert_eq!(t.pieces, vec![Piece::Text("%".into())]);
    }

    #[test]
    fn test_arg_count_checked() {
        let err = Template::compile("assign", "%c = %c", &[Arg::Child(0)]).unwrap_err();
        assert!(matches!(err, TemplateError::ArgCount { used: 2, given: 1, .. }));
        let err = Template::compile("pass", "pass", &[Arg::Child(0)]).unwrap_err();
        assert!(matches!(err, TemplateError::ArgCount { used: 0, given: 1, .. }));
    }

    #[test]
    fn test_arg_kind_checked() {
        let err = Template::compile("call", "%C", &[Arg::Child(0)]).unwrap_err();
        assert!(matches!(err, TemplateError::ArgKind { marker: 'C', .. }));
        let err = Template::compile("ret", "%p", &[Arg::Join(0, 1, "")]).unwrap_err();
        assert!(matches!(err, TemplateError::ArgKind { marker: 'p', .. }));
    }

    #[test]
    fn test_unknown_marker_and_expr() {
        assert!(matches!(
            Template::compile("k", "%q", &[]),
            Err(TemplateError::UnknownMarker { marker: 'q', .. })
        ));
        assert!(matches!(
            Template::compile("k", "%{linestart}", &[]),
            Err(TemplateError::UnknownExpr { .. })
        ));
        assert!(matches!(
            Template::compile("k", "abc%", &[]),
            Err(TemplateError::Truncated { .. })
        ));
    }

    #[test]
    fn test_slice_bounds() {
        assert_eq!(slice_bounds(5, 0, MAXINT), (0, 5));
        assert_eq!(slice_bounds(5, 1, -1), (1, 4));
        assert_eq!(slice_bounds(5, -2, MAXINT), (3, 5));
        assert_eq!(slice_bounds(2, 3, 1), (2, 2));
        assert_eq!(slice_bounds(0, 1, -1), (0, 0));
    }
}