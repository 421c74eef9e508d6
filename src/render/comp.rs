//! Comprehensions and generator expressions.
//!
//! The compiler emits either a nested code object called with the outermost
//! iterable, or the loop inline. Both shapes are reduced to one clause list
//! (`for` and `if` in source order plus the body) and rendered the same way.

use super::walker::SourceWalker;
use crate::error::{DeparseError, Result};
use crate::lang::{CodeObject, Node, Token, Tree};

/// Wrappers that only introduce the next clause.
const ITER_KINDS: &[&str] = &["list_iter", "comp_iter", "set_iter", "set_iter_async"];

/// Innermost nodes holding the produced value.
const BODY_KINDS: &[&str] = &[
    "comp_body",
    "gen_comp_body",
    "set_comp_body",
    "dict_comp_body",
    "lc_body",
];

/// Guards whose condition is child 0 and whose continuation is the last
/// iter child.
const IF_KINDS: &[&str] = &[
    "comp_if",
    "comp_if_not",
    "list_if",
    "list_if_not",
    "list_if37",
    "list_if37_not",
];

/// Guards combining several tests into one boolean.
const COMPOUND_IF_KINDS: &[&str] = &[
    "comp_if_or",
    "comp_if_or2",
    "comp_if_and",
    "comp_if_not_or",
    "comp_if_or_not",
    "comp_if_not_and",
    "list_if_and_or",
];

/// Operands that can hold the iterable of a `for` clause.
const ITERABLE_KINDS: &[&str] = &[
    "expr",
    "get_iter",
    "get_aiter",
    "LOAD_ARG",
    "LOAD_FAST",
    "expr_or_arg",
];

/// Precedence of comprehension operands.
const COMP_PREC: i32 = 27;
/// Precedence of the tests inside a compound guard.
const TEST_PREC: i32 = 24;

/// Where the iterable of a `for` clause lives.
enum Source<'t> {
    /// The `.0` argument: the iterable passed in by the caller.
    Outer,
    Tree(&'t Tree),
}

enum Clause<'t> {
    For { store: &'t Tree, source: Source<'t> },
    If { cond: &'t Tree, negate: bool },
    Compound(CompoundGuard<'t>),
}

/// Several tests joined into one guard, e.g. `a or not b`.
struct CompoundGuard<'t> {
    tests: Vec<&'t Tree>,
    /// Operator between test `i` and `i + 1`; the last one repeats.
    joiners: Vec<&'static str>,
    negate_first: bool,
    negate_last: bool,
}

impl<'t> CompoundGuard<'t> {
    /// Reads the boolean shape off the kind: `comp_if_not_or` is
    /// `not a or b`, `comp_if_or_not` is `a or not b`, `list_if_and_or` is
    /// `a and b or c`.
    fn new(kind: &str, tests: Vec<&'t Tree>) -> Self {
        let words: Vec<&str> = kind
            .trim_start_matches("comp_if")
            .trim_start_matches("list_if")
            .split('_')
            .filter(|w| !w.is_empty())
            .collect();
        let joiners = words
            .iter()
            .filter_map(|w| match w.trim_end_matches(char::is_numeric) {
                "and" => Some(" and "),
                "or" => Some(" or "),
                _ => None,
            })
            .collect();
        Self {
            tests,
            joiners,
            negate_first: words.first() == Some(&"not"),
            negate_last: words.len() > 1 && words.last() == Some(&"not"),
        }
    }

    fn joiner(&self, gap: usize) -> &'static str {
        self.joiners
            .get(gap)
            .or(self.joiners.last())
            .copied()
            .unwrap_or(" and ")
    }
}

/// `LOAD_ARG .0` or a fast load of `.0`, possibly wrapped.
fn is_outer_arg(tree: &Tree) -> bool {
    match tree.unwrap_single(&["expr", "expr_or_arg", "get_iter"]) {
        Tree::Token(t) => t.is("LOAD_ARG") || t.pattr == ".0",
        Tree::Node(_) => false,
    }
}

fn iter_child(node: &Tree) -> Option<&Tree> {
    node.children().iter().rev().find(|c| c.is_any(ITER_KINDS))
}

/// The token carrying the nested code object, directly or one level down
/// (`load_genexpr`, `load_closure`).
fn code_token(node: &Node) -> Option<&Token> {
    let direct = node.children.iter().filter_map(Tree::as_token);
    let nested = node
        .children
        .iter()
        .filter(|c| c.as_node().is_some())
        .flat_map(|c| c.children().iter().filter_map(Tree::as_token));
    direct.chain(nested).find(|t| t.attr.as_code().is_some())
}

/// The caller-side iterable: the first expression after `MAKE_FUNCTION`.
fn outer_collection(node: &Node) -> Option<&Tree> {
    let start = node
        .children
        .iter()
        .position(|c| c.kind().starts_with("MAKE_FUNCTION"))
        .map_or(0, |i| i + 1);
    let found = node.children[start..]
        .iter()
        .find(|c| c.is_any(&["expr", "get_iter", "get_aiter", "expr_get_aiter"]))?;
    if found.is("get_iter") {
        found.get(0)
    } else {
        Some(found)
    }
}

/// Skips the statement and return wrappers around the comprehension proper.
fn strip_wrappers(mut tree: &Tree) -> &Tree {
    const WRAPPERS: &[&str] = &[
        "stmts",
        "sstmt",
        "stmt",
        "return",
        "return_expr",
        "lambda_start",
        "return_expr_lambda",
    ];
    while let Some(first) = tree.get(0) {
        if tree.len() == 1 || tree.is_any(WRAPPERS) {
            tree = first;
        } else {
            break;
        }
    }
    tree
}

fn empty(n: &Tree) -> DeparseError {
    DeparseError::internal(format!("empty {}", n.kind()))
}

/// Splits a comprehension tree into its clauses and body.
fn collect_clauses(root: &Tree) -> Result<(Vec<Clause<'_>>, &Tree)> {
    let mut clauses = Vec::new();
    let mut n = if root.child_of_kind("store").is_some() {
        root
    } else {
        iter_child(root).ok_or_else(|| {
            DeparseError::internal(format!(
                "comprehension '{}' has no iteration clause",
                root.kind()
            ))
        })?
    };

    loop {
        if n.is_any(BODY_KINDS) {
            return Ok((clauses, n));
        }
        if n.is_any(ITER_KINDS) {
            n = n.get(0).ok_or_else(|| empty(n))?;
            continue;
        }
        // awaited body of an async comprehension
        if n.is("await_expr") {
            return Ok((clauses, n));
        }

        let next = iter_child(n);
        if let Some(store) = n.child_of_kind("store") {
            let iterable = n.children().iter().find(|c| c.is_any(ITERABLE_KINDS));
            let source = match iterable {
                Some(it) if !is_outer_arg(it) => Source::Tree(it),
                _ => Source::Outer,
            };
            clauses.push(Clause::For { store, source });
        } else if n.is_any(IF_KINDS) {
            let cond = n.get(0).ok_or_else(|| empty(n))?;
            let negate = n.kind().ends_with("_not");
            clauses.push(Clause::If { cond, negate });
        } else if n.is_any(COMPOUND_IF_KINDS) {
            let tests = n
                .children()
                .iter()
                .filter(|c| {
                    c.as_node().is_some()
                        && !c.is_any(ITER_KINDS)
                        && !c.kind().starts_with("come_from")
                })
                .collect();
            clauses.push(Clause::Compound(CompoundGuard::new(n.kind(), tests)));
        } else if next.is_none() {
            return Err(DeparseError::internal(format!(
                "unexpected '{}' inside a comprehension",
                n.kind()
            )));
        }
        n = next.ok_or_else(|| {
            DeparseError::internal(format!("'{}' has no continuation", n.kind()))
        })?;
    }
}

impl SourceWalker<'_> {
    pub(crate) fn n_comprehension(&mut self, node: &Node) -> Result<()> {
        let (open, close) = match node.kind.trim_end_matches("_async") {
            "list_comp" => ("[", "]"),
            "set_comp" | "dict_comp" => ("{", "}"),
            _ => ("(", ")"),
        };
        let is_async = node.kind.ends_with("_async");

        match code_token(node).and_then(|t| t.attr.as_code()) {
            Some(code) => {
                let inner = self.comprehension_tree(code)?;
                let outer = outer_collection(node);
                self.write(open);
                self.comprehension_clauses(strip_wrappers(&Tree::Node(inner)), outer, is_async)?;
                self.write(close);
            }
            None => {
                self.write(open);
                self.comprehension_clauses(&Tree::Node(node.clone()), None, is_async)?;
                self.write(close);
            }
        }
        Ok(())
    }

    fn comprehension_tree(&mut self, code: &CodeObject) -> Result<Node> {
        self.build_nested(code, false)
    }

    fn comprehension_clauses(
        &mut self,
        root: &Tree,
        outer: Option<&Tree>,
        is_async: bool,
    ) -> Result<()> {
        let root = strip_wrappers(root);
        let (clauses, body) = collect_clauses(root)?;
        let lambda_prec = self.tables.precedence("lambda_body") - 1;
        self.with_prec(lambda_prec, |w| {
            w.with_prec(COMP_PREC, |w| w.preorder(body))?;
            let mut first_for = true;
            for clause in &clauses {
                match clause {
                    Clause::For { store, source } => {
                        w.write(if first_for && is_async { " async for " } else { " for " });
                        first_for = false;
                        w.preorder(store)?;
                        w.write(" in ");
                        let iterable = match source {
                            Source::Tree(it) => Some(*it),
                            Source::Outer => outer,
                        };
                        match iterable {
                            Some(it) => w.with_prec(COMP_PREC, |w| w.preorder(it))?,
                            None => w.write(".0"),
                        }
                    }
                    Clause::If { cond, negate } => {
                        w.write(if *negate { " if not " } else { " if " });
                        w.with_prec(COMP_PREC, |w| w.preorder(cond))?;
                    }
                    Clause::Compound(guard) => w.compound_guard(guard)?,
                }
            }
            Ok(())
        })
    }

    fn compound_guard(&mut self, guard: &CompoundGuard<'_>) -> Result<()> {
        self.write(" if ");
        let last = guard.tests.len().saturating_sub(1);
        for (i, test) in guard.tests.iter().enumerate() {
            if i > 0 {
                self.write(guard.joiner(i - 1));
            }
            if (i == 0 && guard.negate_first) || (i == last && guard.negate_last) {
                self.write("not ");
            }
            self.with_prec(TEST_PREC, |w| w.preorder(test))?;
        }
        Ok(())
    }
}
