use super::grammar::{CompileMode, GrammarParser, ParseFailure};
use super::reducecheck::ReduceChecker;
use crate::lang::{CodeObject, Node, Token};
use std::collections::BTreeMap;
use tracing::debug;

/// A [`GrammarParser`] that hands back trees recorded by an earlier parse,
/// keyed by code-object qualified name.
#[derive(Debug, Clone, Default)]
pub struct ReplayParser {
    trees: BTreeMap<String, Node>,
    /// Keys served so far, in request order.
    served: Vec<String>,
}

impl ReplayParser {
    pub fn new(trees: BTreeMap<String, Node>) -> Self {
        Self {
            trees,
            served: Vec::new(),
        }
    }

    pub fn with_tree(mut self, key: impl Into<String>, tree: Node) -> Self {
        self.trees.insert(key.into(), tree);
        self
    }

    pub fn served(&self) -> &[String] {
        &self.served
    }
}

impl GrammarParser for ReplayParser {
    fn parse(
        &mut self,
        code: &CodeObject,
        tokens: &[Token],
        mode: CompileMode,
        _checker: &ReduceChecker<'_>,
    ) -> Result<Node, ParseFailure> {
        let key = code.key();
        let tree = self.trees.get(key).cloned().ok_or_else(|| {
            ParseFailure::new(format!("no recorded parse for code object '{}'", key))
                .with_window(tokens, 0, 3)
        })?;
        if mode == CompileMode::Exec || tree.kind == mode.start_symbol() {
            debug!(code = key, root = %tree.kind, "replaying recorded parse");
            self.served.push(key.to_string());
            Ok(tree)
        } else {
            Err(ParseFailure::new(format!(
                "recorded parse for '{}' starts at {}, expected {}",
                key,
                tree.kind,
                mode.start_symbol()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::InstructionIndex;

    #[test]
    fn test_replays_by_qualname() {
        let mut parser = ReplayParser::default().with_tree("f", Node::new("stmts", vec![]));
        let code = CodeObject::new("f");
        let index = InstructionIndex::default();
        let checker = ReduceChecker::new(&index);
        let tree = parser
            .parse(&code, &[], CompileMode::Exec, &checker)
            .unwrap();
        assert_eq!(tree.kind, "stmts");
        assert_eq!(parser.served(), ["f".to_string()]);
    }

    #[test]
    fn test_missing_tree_fails_with_window() {
        let mut parser = ReplayParser::default();
        let code = CodeObject::new("g");
        let index = InstructionIndex::default();
        let checker = ReduceChecker::new(&index);
        let tokens = vec![Token::new("NOP", 0), Token::new("RETURN_VALUE", 2)];
        let err = parser
            .parse(&code, &tokens, CompileMode::Exec, &checker)
            .unwrap_err();
        assert!(err.message.contains("'g'"));
        assert_eq!(err.window.len(), 2);
    }

    #[test]
    fn test_start_symbol_mismatch() {
        let mut parser =
            ReplayParser::default().with_tree("<lambda>", Node::new("stmts", vec![]));
        let code = CodeObject::new("<lambda>");
        let index = InstructionIndex::default();
        let checker = ReduceChecker::new(&index);
        assert!(parser
            .parse(&code, &[], CompileMode::Lambda, &checker)
            .is_err());
    }
}