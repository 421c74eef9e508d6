//! From a token stream to a tree the renderer can walk: token fix-ups for
//! lambdas and implicit returns, the parse, a shape check against the
//! template assertions, and the docstring rewrite.

use crate::error::Result;
use crate::lang::{CodeObject, Node, Token, Tree, Value};
use crate::options::DeparseOptions;
use crate::parse::{CompileMode, GrammarParser, ParseFailure, ReduceChecker};
use crate::render::Tables;
use crate::render::template::Arg;
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// Terminals whose operand is a name declared `global` by a store.
const GLOBAL_STORES: &[&str] = &["STORE_GLOBAL", "DELETE_GLOBAL"];

/// Terminals that rebind a cell variable.
const CELL_STORES: &[&str] = &["STORE_DEREF", "DELETE_DEREF"];

/// A parsed, normalized tree plus the shape diagnostics found in it.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltTree {
    pub tree: Node,
    pub diagnostics: Vec<String>,
}

/// The tree of a body with nothing left to render.
pub fn pass_tree() -> Node {
    Node::new("stmts", vec![Tree::node("pass", vec![])])
}

/// The token stream handed to the parser, or `None` when nothing remains
/// to parse.
///
/// Lambda bodies get their returns relabeled and a closing marker. Other
/// bodies lose the implicit trailing `return None` when internals are
/// hidden; a trailing return that must stay is flagged with `RETURN_LAST`.
pub fn prepare_tokens(
    code: &CodeObject,
    mode: CompileMode,
    is_top_level: bool,
    opts: &DeparseOptions,
) -> Option<Vec<Token>> {
    let mut tokens = code.tokens.clone();

    if mode.is_lambda() {
        for token in &mut tokens {
            match token.kind.as_str() {
                "RETURN_VALUE" => token.kind = "RETURN_VALUE_LAMBDA".to_string(),
                "RETURN_END_IF" => token.kind = "RETURN_END_IF_LAMBDA".to_string(),
                _ => {}
            }
        }
        let end = tokens.last().map_or(0, |t| t.offset);
        tokens.push(Token::new("LAMBDA_MARKER", end));
        return Some(tokens);
    }

    if opts.hide_internal && tokens.len() >= 2 {
        let n = tokens.len();
        let end = tokens[n - 1].offset;
        if matches!(tokens[n - 1].kind.as_str(), "RETURN_VALUE" | "RETURN_VALUE_LAMBDA") {
            let tail = &tokens[n - 2];
            if tail.is("LOAD_CONST") && (is_top_level || tail.attr.is_none()) {
                trace!(code = code.key(), "dropping implicit trailing return");
                tokens.truncate(n - 2);
            } else {
                tokens.push(Token::new("RETURN_LAST", end));
            }
        }
    }

    if tokens.is_empty() { None } else { Some(tokens) }
}

/// Parses `code` and normalizes the result.
pub fn build_tree(
    parser: &mut dyn GrammarParser,
    code: &CodeObject,
    mode: CompileMode,
    is_top_level: bool,
    opts: &DeparseOptions,
) -> Result<BuiltTree> {
    let Some(tokens) = prepare_tokens(code, mode, is_top_level, opts) else {
        debug!(code = code.key(), "empty body");
        return Ok(BuiltTree { tree: pass_tree(), diagnostics: Vec::new() });
    };

    let checker = ReduceChecker::new(&code.instructions);
    let tree = parser.parse(code, &tokens, mode, &checker)?;
    if mode != CompileMode::Exec && tree.kind != mode.start_symbol() {
        return Err(ParseFailure::new(format!(
            "parse of '{}' ends in {}, expected {}",
            code.key(),
            tree.kind,
            mode.start_symbol()
        ))
        .into());
    }

    let mut diagnostics = Vec::new();
    check_shapes(&tree, &mut diagnostics);
    let tree = if mode == CompileMode::Exec { transform_docstring(tree) } else { tree };
    debug!(code = code.key(), root = %tree.kind, diagnostics = diagnostics.len(), "tree built");
    Ok(BuiltTree { tree, diagnostics })
}

// =========================================================================
// Shape check
// =========================================================================

/// Records every node that fails the child assertions of its template.
pub fn check_shapes(node: &Node, diagnostics: &mut Vec<String>) {
    if let Some(args) = Tables::assertions(&node.kind) {
        for arg in args {
            if let Some(problem) = assertion_failure(node, arg) {
                let at = node.first_token().map_or(0, |t| t.offset);
                diagnostics.push(format!("{} at offset {}: {}", node.kind, at, problem));
            }
        }
    }
    for child in &node.children {
        if let Tree::Node(n) = child {
            check_shapes(n, diagnostics);
        }
    }
}

fn assertion_failure(node: &Node, arg: &Arg) -> Option<String> {
    let (index, kinds) = match *arg {
        Arg::Child(i) | Arg::Prec(i, _) => (i, None),
        Arg::Expect(i, kinds) | Arg::ExpectPrec(i, kinds, _) => (i, Some(kinds)),
        Arg::Join(..) | Arg::JoinPrec(..) => return None,
    };
    match (node.get(index), kinds) {
        (None, _) => Some(format!("missing child {} of {}", index, node.len())),
        (Some(child), Some(kinds)) if !child.is_any(kinds) => Some(format!(
            "child {} is {}, expected one of {}",
            index,
            child.kind(),
            kinds.join("/")
        )),
        _ => None,
    }
}

// =========================================================================
// Docstring rewrite
// =========================================================================

/// `(wrapper kinds, core)` of a statement.
fn unwrap_statement(stmt: &Tree) -> (Vec<&str>, &Tree) {
    let mut wrappers = Vec::new();
    let mut core = stmt;
    while core.is_any(&["sstmt", "stmt"]) && core.len() == 1 {
        wrappers.push(core.kind());
        match core.get(0) {
            Some(inner) => core = inner,
            None => break,
        }
    }
    (wrappers, core)
}

/// The string assigned by `__doc__ = '...'`, if `core` is that statement.
fn doc_assignment(core: &Tree) -> Option<&Token> {
    if !core.is("assign") {
        return None;
    }
    let value = core.get(0)?.unwrap_single(&["expr"]).as_token()?;
    let target = core.path(&[1, 0])?.as_token()?;
    let is_string = matches!(value.attr, Value::Str(_));
    (is_string && target.is("STORE_NAME") && target.pattr == "__doc__").then_some(value)
}

fn is_bootstrap(core: &Tree) -> bool {
    core.is("assign")
        && core
            .path(&[1, 0])
            .and_then(Tree::as_token)
            .is_some_and(|t| {
                t.is("STORE_NAME") && (t.pattr == "__module__" || t.pattr == "__qualname__")
            })
}

/// Rewrites a leading `__doc__` assignment of a module or class body into
/// a `docstring` node.
pub fn transform_docstring(mut tree: Node) -> Node {
    let mut target = None;
    for (i, stmt) in tree.children.iter().enumerate() {
        let (wrappers, core) = unwrap_statement(stmt);
        if is_bootstrap(core) {
            continue;
        }
        if let Some(value) = doc_assignment(core) {
            let mut doc = Node::new("docstring", vec![Tree::Token(value.clone())]);
            doc.transformed_by = Some("docstring".to_string());
            let mut rebuilt = Tree::Node(doc);
            for kind in wrappers.iter().rev() {
                rebuilt = Tree::node(*kind, vec![rebuilt]);
            }
            target = Some((i, rebuilt));
        }
        break;
    }
    if let Some((i, rebuilt)) = target {
        trace!("docstring assignment rewritten");
        tree.children[i] = rebuilt;
    }
    tree
}

// =========================================================================
// Declarations
// =========================================================================

/// Names a body must declare `global` and `nonlocal`.
pub fn find_globals_and_nonlocals(
    tree: &Node,
    code: &CodeObject,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut globals = BTreeSet::new();
    let mut nonlocals = BTreeSet::new();
    collect_declarations(tree, code, &mut globals, &mut nonlocals);
    (globals, nonlocals)
}

fn collect_declarations(
    node: &Node,
    code: &CodeObject,
    globals: &mut BTreeSet<String>,
    nonlocals: &mut BTreeSet<String>,
) {
    for child in &node.children {
        match child {
            Tree::Node(n) => collect_declarations(n, code, globals, nonlocals),
            Tree::Token(t) if GLOBAL_STORES.contains(&t.kind.as_str()) => {
                globals.insert(t.pattr.clone());
            }
            Tree::Token(t)
                if CELL_STORES.contains(&t.kind.as_str())
                    && code.freevars.contains(&t.pattr)
                    && t.pattr != code.name
                    && !code.is_lambda() =>
            {
                nonlocals.insert(t.pattr.clone());
            }
            Tree::Token(_) => {}
        }
    }
}
