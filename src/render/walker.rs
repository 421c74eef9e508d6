use super::state::RenderState;
use super::tables::{NO_PARENTHESIS_EVER, Tables};
use crate::error::{DeparseError, Result};
use crate::lang::{CodeObject, Node, Token, Tree};
use crate::normalize::{self, BuiltTree};
use crate::options::DeparseOptions;
use crate::parse::{CompileMode, GrammarParser};
use tracing::{debug, warn};

/// Renders parse trees back to source text.
///
/// One walker serves one top-level render pass: it owns the template
/// tables (grown by `customize` as nested code objects are met), the
/// output state and the diagnostics collected along the way.
pub struct SourceWalker<'p> {
    pub(crate) opts: DeparseOptions,
    pub(crate) tables: Tables,
    parser: &'p mut dyn GrammarParser,
    pub(crate) state: RenderState,
    /// Binding strength of the surrounding context; a child whose own
    /// precedence is larger gets parenthesized.
    pub(crate) prec: i32,
    pub(crate) diagnostics: Vec<String>,
}

impl<'p> SourceWalker<'p> {
    pub fn new(parser: &'p mut dyn GrammarParser, opts: DeparseOptions) -> Result<Self> {
        Ok(Self {
            opts,
            tables: Tables::new()?,
            parser,
            state: RenderState::new(),
            prec: NO_PARENTHESIS_EVER,
            diagnostics: Vec::new(),
        })
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn into_text(self) -> String {
        self.state.finish()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Renders a subtree. The precedence seen by the caller is the same
    /// before and after, whatever the handler did to it.
    pub fn preorder(&mut self, tree: &Tree) -> Result<()> {
        match tree {
            Tree::Token(token) => self.preorder_token(token),
            Tree::Node(node) => self.preorder_node(node),
        }
    }

    pub fn preorder_node(&mut self, node: &Node) -> Result<()> {
        let saved = self.prec;
        let result = self.dispatch(node);
        self.prec = saved;
        self.tolerate(result)
    }

    fn preorder_token(&mut self, token: &Token) -> Result<()> {
        if let Some(line) = token.line_start {
            self.state.line_number = line;
        }
        let saved = self.prec;
        let result = self.render_token(token);
        self.prec = saved;
        self.tolerate(result)
    }

    /// In tolerant mode a template assertion is recorded and the subtree
    /// skipped; otherwise it aborts the render.
    fn tolerate(&mut self, result: Result<()>) -> Result<()> {
        match result {
            Err(err @ DeparseError::Template { .. }) if self.opts.tolerate_errors => {
                self.record(err.to_string());
                Ok(())
            }
            other => other,
        }
    }

    pub(crate) fn record(&mut self, diagnostic: String) {
        if !self.diagnostics.contains(&diagnostic) {
            warn!(%diagnostic, "shape diagnostic");
            self.diagnostics.push(diagnostic);
        }
    }

    fn dispatch(&mut self, node: &Node) -> Result<()> {
        match node.kind.as_str() {
            // expressions
            "expr" | "return_expr_or_cond" => self.n_expr(node),
            "bin_op" => self.n_bin_op(node),
            "return_expr" => self.n_return_expr(node),
            "slice2" => self.n_slice2(node),
            "slice3" => self.n_slice3(node),
            "yield" => self.n_yield(node),
            "attribute" => self.n_attribute(node),
            "store" => self.n_store(node),
            "subscript" | "subscript2" | "store_subscript" | "delete_subscript" => {
                self.n_subscript(node)
            }
            "unpack" | "unpack_w_parens" => self.n_unpack(node),
            "assign2" | "assign3" => self.n_assign_n(node),
            "except_cond2" => self.n_except_cond2(node),
            "list" | "set" | "tuple" | "build_set" => self.n_list(node),
            "dict" => self.n_dict(node),
            "call_kw36" => self.n_call_kw(node),
            // statements
            "return" | "return_if_stmt" => self.n_return(node),
            "return_expr_lambda" | "return_call_lambda" => self.n_return_expr_lambda(node),
            "ifelsestmtr" | "ifelsestmtr2" => self.n_ifelsestmtr(node),
            "elifelsestmtr" => self.n_elifelsestmtr(node),
            "alias" | "alias37" => self.n_alias(node),
            "docstring" => self.n_docstring(node),
            // nested code objects
            "list_comp" | "list_comp_async" | "set_comp" | "set_comp_async" | "dict_comp"
            | "dict_comp_async" | "generator_exp" | "generator_exp_async" => {
                self.n_comprehension(node)
            }
            "function_def" => self.n_function_def(node),
            "mkfunc" => self.n_mkfunc(node),
            "lambda_body" => self.n_lambda_body(node),
            "classdef" | "classdefdeco2" => self.n_classdef(node),
            _ => self.default(node),
        }
    }

    fn render_token(&mut self, token: &Token) -> Result<()> {
        if token.kind == "LOAD_CONST" {
            return self.n_load_const(token);
        }
        if let Some(template) = self.tables.direct(&token.kind) {
            self.token_template(&template, token)?;
        }
        Ok(())
    }

    /// Renders `node` through its table template, or its children in order
    /// when there is none.
    pub(crate) fn default(&mut self, node: &Node) -> Result<()> {
        self.default_as(node, &node.kind)
    }

    /// Renders `node` as if it were of kind `kind`.
    pub(crate) fn default_as(&mut self, node: &Node, kind: &str) -> Result<()> {
        match self.tables.lookup(kind, &node.children) {
            Some(template) => self.template_engine(&template, node, kind),
            None => node.children.iter().try_for_each(|child| self.preorder(child)),
        }
    }

    /// Renders `tree` into a fresh scope and returns the text instead of
    /// writing it.
    pub(crate) fn traverse(
        &mut self,
        tree: &Tree,
        indent: Option<&str>,
        is_lambda: bool,
    ) -> Result<String> {
        let indent = indent.map_or_else(|| self.state.indent().to_string(), str::to_string);
        self.state.enter(indent, is_lambda);
        let result = self.preorder(tree);
        let text = self.state.leave();
        result.map(|()| text)
    }

    /// Renders the whole tree of one code object into the current scope.
    pub fn gen_source(&mut self, tree: &Node, code: &CodeObject) -> Result<()> {
        self.tables.customize(&code.customize)?;
        if tree.is_empty() {
            let line = format!("{}pass", self.state.indent());
            self.println(&line);
            return Ok(());
        }
        self.preorder_node(tree)
    }

    // =========================================================================
    // Nested code objects
    // =========================================================================

    /// Parses and normalizes a nested code object.
    ///
    /// In tolerant mode a parse failure becomes a `parse_error` node that
    /// renders as a comment.
    pub(crate) fn build_nested(&mut self, code: &CodeObject, is_lambda: bool) -> Result<Node> {
        debug!(code = code.key(), is_lambda, "rebuilding nested code object");
        let mode = if is_lambda {
            CompileMode::Lambda
        } else {
            CompileMode::Exec
        };
        let built = normalize::build_tree(&mut *self.parser, code, mode, false, &self.opts);
        match built {
            Ok(BuiltTree { tree, diagnostics }) => {
                self.tables.customize(&code.customize)?;
                for diagnostic in diagnostics {
                    self.record(diagnostic);
                }
                Ok(tree)
            }
            Err(DeparseError::Parse(failure)) if self.opts.tolerate_errors => {
                let message = format!("parse error in {}: {}", code.key(), failure.message);
                self.record(message.clone());
                let mut marker = Token::new("PARSE_ERROR", 0);
                marker.pattr = message;
                Ok(Node::new("parse_error", vec![Tree::Token(marker)]))
            }
            Err(err) => Err(err),
        }
    }

    // =========================================================================
    // Output helpers
    // =========================================================================

    pub(crate) fn write(&mut self, text: &str) {
        self.state.write(text);
    }

    pub(crate) fn println(&mut self, text: &str) {
        self.state.println(text);
    }

    pub(crate) fn write_indent(&mut self) {
        let indent = self.state.indent().to_string();
        self.state.write(&indent);
    }

    pub(crate) fn indent_more(&mut self) {
        self.state.indent_more(&self.opts.indent);
    }

    pub(crate) fn indent_less(&mut self) {
        self.state.indent_less(&self.opts.indent);
    }

    /// Runs `f` with the precedence set to `prec`, restoring it afterwards
    /// even when `f` fails.
    pub(crate) fn with_prec<T>(
        &mut self,
        prec: i32,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let saved = std::mem::replace(&mut self.prec, prec);
        let result = f(self);
        self.prec = saved;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Value;
    use crate::parse::ReplayParser;

    fn name(kind: &str, n: &str) -> Tree {
        Tree::Token(Token::name(kind, n, 0))
    }

    fn node(kind: &str, children: Vec<Tree>) -> Tree {
        Tree::node(kind, children)
    }

    fn render(tree: &Tree) -> String {
        let mut parser = ReplayParser::default();
        let mut walker = SourceWalker::new(&mut parser, DeparseOptions::default()).unwrap();
        walker.preorder(tree).unwrap();
        walker.into_text()
    }

    #[test]
    fn test_assign_through_template() {
        let tree = node(
            "assign",
            vec![
                node("expr", vec![name("LOAD_NAME", "b")]),
                node("store", vec![name("STORE_NAME", "a")]),
            ],
        );
        assert_eq!(render(&tree), "a = b\n");
    }

    #[test]
    fn test_untemplated_node_renders_children() {
        let tree = node(
            "stmts",
            vec![
                node("sstmt", vec![node("pass", vec![])]),
                node("sstmt", vec![node("break", vec![])]),
            ],
        );
        assert_eq!(render(&tree), "pass\nbreak\n");
    }

    #[test]
    fn test_descendant_keyed_store() {
        let tree = node(
            "store",
            vec![
                node("expr", vec![name("LOAD_NAME", "obj")]),
                name("STORE_ATTR", "field"),
            ],
        );
        assert_eq!(render(&tree), "obj.field");
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let tree = node("assign", vec![node("expr", vec![name("LOAD_NAME", "b")])]);
        let mut parser = ReplayParser::default();
        let mut walker = SourceWalker::new(&mut parser, DeparseOptions::default()).unwrap();
        let err = walker.preorder(&tree).unwrap_err();
        assert!(matches!(err, DeparseError::Template { .. }));
    }

    #[test]
    fn test_shape_mismatch_recorded_when_tolerant() {
        let bad = node("assign", vec![node("expr", vec![name("LOAD_NAME", "b")])]);
        let tree = node("stmts", vec![bad.clone(), node("pass", vec![]), bad]);
        let mut parser = ReplayParser::default();
        let opts = DeparseOptions::default().with_tolerate_errors(true);
        let mut walker = SourceWalker::new(&mut parser, opts).unwrap();
        walker.preorder(&tree).unwrap();
        assert_eq!(walker.diagnostics().len(), 1);
        assert!(walker.into_text().contains("pass"));
    }

    #[test]
    fn test_precedence_restored_after_every_render() {
        let trees = vec![
            node(
                "expr",
                vec![node(
                    "bin_op",
                    vec![
                        node("expr", vec![name("LOAD_NAME", "a")]),
                        node("expr", vec![name("LOAD_NAME", "b")]),
                        node("binary_operator", vec![Tree::Token(Token::new("BINARY_ADD", 4))]),
                    ],
                )],
            ),
            node(
                "expr",
                vec![Tree::Token(Token::constant("LOAD_CONST", Value::Int(-3), 0))],
            ),
            node("unary_not", vec![node("expr", vec![name("LOAD_NAME", "x")])]),
            // a failing render must not leak either
            node("assign", vec![]),
        ];
        let mut parser = ReplayParser::default();
        let mut walker = SourceWalker::new(&mut parser, DeparseOptions::default()).unwrap();
        for start in [100, 27, 2, -5] {
            for tree in &trees {
                walker.prec = start;
                let _ = walker.preorder(tree);
                assert_eq!(walker.prec, start, "leaked precedence rendering {}", tree.kind());
            }
        }
    }

    #[test]
    fn test_traverse_isolates_output() {
        let mut parser = ReplayParser::default();
        let mut walker = SourceWalker::new(&mut parser, DeparseOptions::default()).unwrap();
        walker.write("x = ");
        let text = walker
            .traverse(&node("expr", vec![name("LOAD_NAME", "y")]), None, false)
            .unwrap();
        assert_eq!(text, "y");
        walker.write(&text);
        assert_eq!(walker.into_text(), "x = y");
    }

    #[test]
    fn test_gen_source_empty_tree() {
        let mut parser = ReplayParser::default();
        let mut walker = SourceWalker::new(&mut parser, DeparseOptions::default()).unwrap();
        walker
            .gen_source(&Node::new("stmts", vec![]), &CodeObject::new("<module>"))
            .unwrap();
        assert_eq!(walker.into_text(), "pass\n");
    }
}