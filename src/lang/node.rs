use super::token::Token;
use super::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One element of a parse tree: either a terminal or a nonterminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tree {
    Token(Token),
    Node(Node),
}

/// A nonterminal produced by a grammar reduction.
///
/// A node exclusively owns its children. Relabeling (picking an alternate
/// template for the same shape) never mutates a node in place: see
/// [`Node::with_kind_at`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: String,
    pub children: Vec<Tree>,
    /// Name of the rewrite that produced this node, if any.
    pub transformed_by: Option<String>,
}

/// Resolves a possibly-negative index against `len`.
pub fn resolve_index(len: usize, index: isize) -> Option<usize> {
    let resolved = if index < 0 {
        len as isize + index
    } else {
        index
    };
    if resolved >= 0 && (resolved as usize) < len {
        Some(resolved as usize)
    } else {
        None
    }
}

impl Node {
    pub fn new(kind: impl Into<String>, children: Vec<Tree>) -> Self {
        Self {
            kind: kind.into(),
            children,
            transformed_by: None,
        }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Child at `index`; negative indexes count from the end.
    pub fn get(&self, index: isize) -> Option<&Tree> {
        resolve_index(self.children.len(), index).map(|i| &self.children[i])
    }

    /// First child of the given kind.
    pub fn child_of_kind(&self, kind: &str) -> Option<&Tree> {
        self.children.iter().find(|c| c.is(kind))
    }

    /// Copy of this node with the descendant at `path` relabeled.
    pub fn with_kind_at(&self, path: &[isize], kind: &str) -> Node {
        let mut copy = self.clone();
        copy.relabel(path, kind);
        copy
    }

    /// Relabels the descendant node at `path` of an owned tree. Returns
    /// false when the path does not lead to a node.
    pub fn relabel(&mut self, path: &[isize], kind: &str) -> bool {
        let Some((&first, rest)) = path.split_first() else {
            self.kind = kind.to_string();
            return true;
        };
        let Some(i) = resolve_index(self.children.len(), first) else {
            return false;
        };
        match &mut self.children[i] {
            Tree::Node(child) => child.relabel(rest, kind),
            Tree::Token(_) => false,
        }
    }

    pub fn first_token(&self) -> Option<&Token> {
        self.children.iter().find_map(Tree::first_token)
    }

    pub fn last_token(&self) -> Option<&Token> {
        self.children.iter().rev().find_map(Tree::last_token)
    }
}

impl Tree {
    pub fn node(kind: impl Into<String>, children: Vec<Tree>) -> Tree {
        Tree::Node(Node::new(kind, children))
    }

    pub fn kind(&self) -> &str {
        match self {
            Tree::Token(t) => &t.kind,
            Tree::Node(n) => &n.kind,
        }
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind() == kind
    }

    pub fn is_any(&self, kinds: &[&str]) -> bool {
        kinds.contains(&self.kind())
    }

    /// Number of children; terminals have none.
    pub fn len(&self) -> usize {
        match self {
            Tree::Token(_) => 0,
            Tree::Node(n) => n.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: isize) -> Option<&Tree> {
        match self {
            Tree::Token(_) => None,
            Tree::Node(n) => n.get(index),
        }
    }

    /// First child of the given kind; terminals have none.
    pub fn child_of_kind(&self, kind: &str) -> Option<&Tree> {
        self.as_node().and_then(|n| n.child_of_kind(kind))
    }

    /// Walks down a path of child indexes.
    pub fn path(&self, indexes: &[isize]) -> Option<&Tree> {
        indexes.iter().try_fold(self, |tree, &i| tree.get(i))
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Tree::Node(n) => Some(n),
            Tree::Token(_) => None,
        }
    }

    pub fn as_token(&self) -> Option<&Token> {
        match self {
            Tree::Token(t) => Some(t),
            Tree::Node(_) => None,
        }
    }

    pub fn children(&self) -> &[Tree] {
        match self {
            Tree::Node(n) => &n.children,
            Tree::Token(_) => &[],
        }
    }

    pub fn first_token(&self) -> Option<&Token> {
        match self {
            Tree::Token(t) => Some(t),
            Tree::Node(n) => n.first_token(),
        }
    }

    pub fn last_token(&self) -> Option<&Token> {
        match self {
            Tree::Token(t) => Some(t),
            Tree::Node(n) => n.last_token(),
        }
    }

    /// `attr` of a terminal.
    pub fn attr(&self) -> Option<&Value> {
        self.as_token().map(|t| &t.attr)
    }

    /// Descends through single-child chains of `expr`-like wrappers.
    pub fn unwrap_single(&self, kinds: &[&str]) -> &Tree {
        let mut tree = self;
        while tree.is_any(kinds) && tree.len() == 1 {
            match tree.get(0) {
                Some(child) => tree = child,
                None => break,
            }
        }
        tree
    }

    /// `LOAD_CONST None`, possibly wrapped in `expr`.
    pub fn is_none_const(&self) -> bool {
        match self.unwrap_single(&["expr"]) {
            Tree::Token(t) => t.kind == "LOAD_CONST" && t.attr.is_none(),
            Tree::Node(_) => false,
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "    ".repeat(depth);
        match self {
            Tree::Token(t) => {
                if t.pattr.is_empty() {
                    writeln!(f, "{}{} ({})", pad, t.kind, t.offset)
                } else {
                    writeln!(f, "{}{} {} ({})", pad, t.kind, t.pattr, t.offset)
                }
            }
            Tree::Node(n) => {
                writeln!(f, "{}{} ({})", pad, n.kind, n.children.len())?;
                for child in &n.children {
                    child.fmt_indented(f, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl From<Token> for Tree {
    fn from(t: Token) -> Self {
        Tree::Token(t)
    }
}

impl From<Node> for Tree {
    fn from(n: Node) -> Self {
        Tree::Node(n)
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.kind, self.children.len())?;
        for child in &self.children {
            child.fmt_indented(f, 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(kind: &str, n: &str, offset: usize) -> Tree {
        Tree::Token(Token::name(kind, n, offset))
    }

    #[test]
    fn test_negative_indexing() {
        let node = Node::new(
            "assign",
            vec![
                name("LOAD_NAME", "a", 0),
                name("STORE_NAME", "b", 2),
            ],
        );
        assert_eq!(node.get(-1).map(Tree::kind), Some("STORE_NAME"));
        assert_eq!(node.get(0).map(Tree::kind), Some("LOAD_NAME"));
        assert!(node.get(2).is_none());
        assert!(node.get(-3).is_none());
    }

    #[test]
    fn test_relabel_produces_copy() {
        let node = Node::new("attribute", vec![Tree::node("expr", vec![])]);
        let relabeled = node.with_kind_at(&[], "attribute_w_parens");
        assert_eq!(node.kind, "attribute");
        assert_eq!(relabeled.kind, "attribute_w_parens");

        let inner = node.with_kind_at(&[0], "expr_w_parens");
        assert_eq!(node.children[0].kind(), "expr");
        assert_eq!(inner.children[0].kind(), "expr_w_parens");
    }

    #[test]
    fn test_relabel_path() {
        let mut node = Node::new(
            "subscript",
            vec![
                Tree::node("expr", vec![name("LOAD_NAME", "a", 0)]),
                Tree::node("expr", vec![Tree::node("tuple", vec![])]),
            ],
        );
        assert!(node.relabel(&[-1, 0], "build_tuple2"));
        assert_eq!(node.get(1).and_then(|t| t.get(0)).map(Tree::kind), Some("build_tuple2"));
        // tokens and missing children are not relabeled
        assert!(!node.relabel(&[0, 0], "x"));
        assert!(!node.relabel(&[5], "x"));
    }

    #[test]
    fn test_first_and_last_token() {
        let tree = Tree::node(
            "stmt",
            vec![
                Tree::node("expr", vec![name("LOAD_NAME", "x", 4)]),
                name("POP_TOP", "", 6),
            ],
        );
        assert_eq!(tree.first_token().map(|t| t.offset), Some(4));
        assert_eq!(tree.last_token().map(|t| t.offset), Some(6));
    }

    #[test]
    fn test_is_none_const() {
        let none = Tree::node(
            "expr",
            vec![Tree::Token(Token::constant("LOAD_CONST", Value::None, 0))],
        );
        assert!(none.is_none_const());
        let one = Tree::Token(Token::constant("LOAD_CONST", Value::Int(1), 0));
        assert!(!one.is_none_const());
    }

    #[test]
    fn test_display_dump() {
        let tree = Tree::node("expr", vec![name("LOAD_NAME", "x", 4)]);
        assert_eq!(tree.to_string(), "expr (1)\n    LOAD_NAME x (4)\n");
    }
}