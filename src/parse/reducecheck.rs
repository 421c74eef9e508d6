//! Reduction checks: side-channel predicates the grammar parser consults
//! before committing to certain reductions.
//!
//! Every check answers "reject?": `true` forces the parser to drop the
//! candidate reduction and try another derivation, `false` accepts it.
//! Checks are pure functions of the rule, the candidate subtree, the token
//! window and the instruction index. A malformed window (indexes outside the
//! token slice) is a caller bug and panics.

use super::grammar::Rule;
use crate::bytecode::InstructionIndex;
use crate::lang::{Node, Token, Tree};
use tracing::trace;

const TEST_KINDS: &[&str] = &["testtrue", "testtruec", "testfalse", "testfalsec"];
const STMT_WRAPPERS: &[&str] = &["c_stmts", "_stmts", "stmts"];

/// Dispatches reduction checks by rule left-hand side.
#[derive(Debug, Clone, Copy)]
pub struct ReduceChecker<'a> {
    index: &'a InstructionIndex,
}

impl<'a> ReduceChecker<'a> {
    pub fn new(index: &'a InstructionIndex) -> Self {
        Self { index }
    }

    /// Rules without a registered check are always accepted.
    pub fn check(
        &self,
        rule: &Rule<'_>,
        tree: &Node,
        tokens: &[Token],
        first: usize,
        last: usize,
    ) -> bool {
        let reject = match rule.lhs {
            "iflaststmt" | "iflaststmtc" => self.iflaststmt(rule, tree, tokens, first, last),
            "whileTruestmt38" => self.while_true_stmt38(tree, tokens, first, last),
            _ => false,
        };
        trace!(rule = %rule, first, last, reject, "reduction check");
        reject
    }

    /// Decides whether an "if that ends the enclosing block" reduction
    /// groups the right span.
    ///
    /// `tree[0]` is the test expression, `tree[1]` the body.
    pub fn iflaststmt(
        &self,
        rule: &Rule<'_>,
        tree: &Node,
        tokens: &[Token],
        first: usize,
        mut last: usize,
    ) -> bool {
        let n = tokens.len();
        if tokens[last].is("RETURN_LAST") {
            last -= 1;
        }

        if rule.lhs == "iflaststmt" && rule.rhs_is(&["testexpr", "stmts"]) {
            if let Some(reject) = self.body_exit_jump(tree, tokens, last) {
                return reject;
            }
        }

        let Some(test) = tree
            .get(0)
            .and_then(|testexpr| testexpr.get(0))
            .filter(|t| t.is_any(TEST_KINDS))
        else {
            return false;
        };

        // A bare (n)and test binds tighter than the statement grouping.
        if test.len() == 1
            && test.get(0).is_some_and(|t| t.is_any(&["nand", "and"]))
            && rule.rhs_is(&["testexpr", "stmts"])
        {
            return true;
        }

        let Some(branch) = test
            .get(1)
            .and_then(Tree::as_token)
            .filter(|t| t.kind.starts_with("POP_JUMP_IF_"))
        else {
            return false;
        };
        let Some(jump_target) = branch.jump_target() else {
            return false;
        };

        let first_offset = tokens[first].offset;
        let last_offset = tokens[last].offset;

        // Below first: jumps to a loop head. Equal to last: plain fallthrough join.
        if first_offset <= jump_target && jump_target < last_offset {
            return true;
        }

        if last + 1 < n {
            if tokens[last - 1].is_loop_jump() {
                if jump_target > first_offset {
                    return true;
                }
            } else if tokens[last + 1].is("COME_FROM_LOOP") && !tokens[last].is("BREAK_LOOP") {
                return true;
            }
        }

        // `if a and b:` compiles to two branches sharing one join point.
        if first > 0 && tokens[first - 1].is("POP_JUMP_IF_FALSE") {
            return tokens[first - 1].jump_target() != Some(jump_target);
        }

        if jump_target > last_offset && tokens[last - 1].jump_target() == Some(jump_target) {
            return false;
        }
        false
    }

    /// The unconditional forward jump right before the body, if any, must
    /// land on the last token unless another jump in the body shares its
    /// target. `None` when there is no such jump.
    fn body_exit_jump(&self, tree: &Node, tokens: &[Token], last: usize) -> Option<bool> {
        let body_offset = tree.get(1)?.first_token()?.offset;
        let body_index = self.index.index_of(body_offset)?;
        let jump = self.index.get(body_index.checked_sub(1)?)?;
        if !jump.is_unconditional_jump() {
            return None;
        }
        let target = jump.jump_target().filter(|&t| t > jump.offset)?;
        if target == tokens[last].offset {
            return Some(false);
        }

        let shared = self.index.as_slice()[body_index..]
            .iter()
            .take_while(|inst| inst.offset < target)
            .any(|inst| inst.jump_target() == Some(target));
        Some(shared)
    }

    /// Checks a `while True:` loop reduction: the closing `JUMP_LOOP` must
    /// reach back to the loop's first statement and not belong to a nested
    /// `for`/`if`.
    pub fn while_true_stmt38(
        &self,
        tree: &Node,
        tokens: &[Token],
        first: usize,
        mut last: usize,
    ) -> bool {
        if !tokens[last].is("COME_FROM") && tokens[last - 1].is("COME_FROM") {
            last -= 1;
        }
        if tokens[last - 1].kind.starts_with("RAISE_VARARGS") {
            return true;
        }
        while tokens[last].is("COME_FROM") {
            last -= 1;
        }

        let jump_loop = &tokens[last];
        if !jump_loop.is("JUMP_LOOP") {
            return true;
        }
        let first_offset = tokens[first].offset;
        let Some(loop_target) = jump_loop.jump_target() else {
            return true;
        };
        if first_offset > loop_target {
            return true;
        }

        let mut body: &[Tree] = &tree.children;
        if body.first().is_some_and(|t| t.is("_come_froms")) {
            body = body.get(1).map(Tree::children).unwrap_or_default();
        }
        while let Some(wrapper) = body.first().filter(|t| t.is_any(STMT_WRAPPERS)) {
            body = wrapper.children();
        }
        let Some(first_stmt) = body.first() else {
            return true;
        };

        let kind = first_stmt.kind();
        if kind.starts_with("for") || kind.starts_with("if") {
            // The loop jump may not sit right after the nested statement.
            let Some(stmt_last) = first_stmt.last_token() else {
                return true;
            };
            let gap = jump_loop.offset as isize - stmt_last.offset as isize;
            (0..=2).contains(&gap)
        } else {
            first_stmt
                .first_token()
                .is_none_or(|t| first_offset >= t.offset)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Instruction;

    const IFLAST: Rule<'static> = Rule {
        lhs: "iflaststmt",
        rhs: &["testexpr", "stmts"],
    };
    const IFLASTC: Rule<'static> = Rule {
        lhs: "iflaststmtc",
        rhs: &["testexpr", "c_stmts"],
    };

    fn tok(kind: &str, offset: usize) -> Token {
        Token::new(kind, offset)
    }

    fn leaf(kind: &str, offset: usize) -> Tree {
        Tree::Token(tok(kind, offset))
    }

    /// `if <x>: <body>` with the test branch at offset 12.
    fn if_tree(branch: &str, target: usize, body_offset: usize) -> Node {
        Node::new(
            "iflaststmt",
            vec![
                Tree::node(
                    "testexpr",
                    vec![Tree::node(
                        "testfalse",
                        vec![
                            Tree::node("expr", vec![leaf("LOAD_NAME", 10)]),
                            Tree::Token(Token::jump(branch, target, 12)),
                        ],
                    )],
                ),
                Tree::node(
                    "stmts",
                    vec![Tree::node("expr_stmt", vec![leaf("LOAD_NAME", body_offset)])],
                ),
            ],
        )
    }

    fn window() -> Vec<Token> {
        vec![tok("LOAD_NAME", 10), tok("LOAD_NAME", 20), tok("POP_TOP", 30)]
    }

    fn index_with_branch(target: usize) -> InstructionIndex {
        InstructionIndex::new(vec![
            Instruction::new(10, "LOAD_NAME"),
            Instruction::jump_abs(12, "POP_JUMP_IF_FALSE", target),
            Instruction::new(20, "LOAD_NAME"),
            Instruction::new(30, "POP_TOP"),
        ])
    }

    #[test]
    fn test_branch_inside_span_rejects() {
        let index = index_with_branch(25);
        let checker = ReduceChecker::new(&index);
        let tree = if_tree("POP_JUMP_IF_FALSE", 25, 20);
        assert!(checker.check(&IFLAST, &tree, &window(), 0, 2));
    }

    #[test]
    fn test_branch_to_last_token_accepts() {
        let index = index_with_branch(30);
        let checker = ReduceChecker::new(&index);
        let tree = if_tree("POP_JUMP_IF_FALSE", 30, 20);
        assert!(!checker.check(&IFLAST, &tree, &window(), 0, 2));
    }

    #[test]
    fn test_branch_before_span_accepts() {
        let index = index_with_branch(5);
        let checker = ReduceChecker::new(&index);
        let tree = if_tree("POP_JUMP_IF_FALSE", 5, 20);
        assert!(!checker.check(&IFLAST, &tree, &window(), 0, 2));
    }

    #[test]
    fn test_containment_law() {
        let index = InstructionIndex::default();
        let checker = ReduceChecker::new(&index);
        for span in 2..12usize {
            let tokens: Vec<Token> = (0..span).map(|i| tok("NOP", 100 + i * 4)).collect();
            let first_offset = tokens[0].offset;
            let last_offset = tokens[span - 1].offset;
            for target in (first_offset - 8)..(last_offset + 8) {
                let tree = if_tree("POP_JUMP_IF_TRUE", target, first_offset);
                let reject = checker.check(&IFLASTC, &tree, &tokens, 0, span - 1);
                if target >= first_offset && target < last_offset {
                    assert!(reject, "target {} inside [{}, {})", target, first_offset, last_offset);
                } else {
                    assert!(
                        !reject,
                        "target {} outside [{}, {})",
                        target, first_offset, last_offset
                    );
                }
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let index = index_with_branch(25);
        let checker = ReduceChecker::new(&index);
        let tree = if_tree("POP_JUMP_IF_FALSE", 25, 20);
        let tokens = window();
        let first = checker.check(&IFLAST, &tree, &tokens, 0, 2);
        for _ in 0..16 {
            assert_eq!(checker.check(&IFLAST, &tree, &tokens, 0, 2), first);
        }
    }

    #[test]
    fn test_return_last_marker_shrinks_window() {
        let index = InstructionIndex::default();
        let checker = ReduceChecker::new(&index);
        let mut tokens = window();
        tokens.push(tok("RETURN_LAST", 32));
        // effective last is offset 30, so 30 is the fallthrough join
        let tree = if_tree("POP_JUMP_IF_FALSE", 30, 20);
        assert!(!checker.check(&IFLASTC, &tree, &tokens, 0, 3));
    }

    #[test]
    fn test_bare_and_test_rejects() {
        let index = InstructionIndex::default();
        let checker = ReduceChecker::new(&index);
        let tree = Node::new(
            "iflaststmt",
            vec![
                Tree::node(
                    "testexpr",
                    vec![Tree::node("testtrue", vec![Tree::node("and", vec![])])],
                ),
                Tree::node("stmts", vec![leaf("LOAD_NAME", 20)]),
            ],
        );
        assert!(checker.check(&IFLAST, &tree, &window(), 0, 2));
        assert!(!checker.check(&IFLASTC, &tree, &window(), 0, 2));
    }

    #[test]
    fn test_chained_and_shares_join_point() {
        let index = InstructionIndex::default();
        let checker = ReduceChecker::new(&index);
        let tokens = vec![
            Token::jump("POP_JUMP_IF_FALSE", 40, 8),
            tok("LOAD_NAME", 10),
            tok("LOAD_NAME", 20),
            tok("POP_TOP", 30),
        ];
        let same = if_tree("POP_JUMP_IF_FALSE", 40, 20);
        assert!(!checker.check(&IFLASTC, &same, &tokens, 1, 3));
        let other = if_tree("POP_JUMP_IF_FALSE", 44, 20);
        assert!(checker.check(&IFLASTC, &other, &tokens, 1, 3));
    }

    #[test]
    fn test_loop_back_before_last_rejects() {
        let index = InstructionIndex::default();
        let checker = ReduceChecker::new(&index);
        let tokens = vec![
            tok("LOAD_NAME", 10),
            Token::jump("JUMP_BACK", 0, 20),
            tok("POP_BLOCK", 30),
            tok("COME_FROM_LOOP", 32),
        ];
        let tree = if_tree("POP_JUMP_IF_FALSE", 34, 20);
        assert!(checker.check(&IFLASTC, &tree, &tokens, 0, 2));
    }

    #[test]
    fn test_escaping_enclosing_loop_rejects() {
        let index = InstructionIndex::default();
        let checker = ReduceChecker::new(&index);
        let mut tokens = vec![
            tok("LOAD_NAME", 10),
            tok("LOAD_NAME", 20),
            tok("POP_BLOCK", 30),
            tok("COME_FROM_LOOP", 32),
        ];
        let tree = if_tree("POP_JUMP_IF_FALSE", 36, 20);
        assert!(checker.check(&IFLASTC, &tree, &tokens, 0, 2));

        tokens[2] = tok("BREAK_LOOP", 30);
        assert!(!checker.check(&IFLASTC, &tree, &tokens, 0, 2));
    }

    #[test]
    fn test_shared_exit_jump_in_body() {
        let tree = if_tree("POP_JUMP_IF_FALSE", 30, 20);
        let tokens = window();

        let mut insts = vec![
            Instruction::new(10, "LOAD_NAME"),
            Instruction::jump_rel(12, "JUMP_FORWARD", 40),
            Instruction::new(20, "LOAD_NAME"),
            Instruction::new(24, "NOP"),
            Instruction::new(30, "POP_TOP"),
        ];
        let lone = InstructionIndex::new(insts.clone());
        assert!(!ReduceChecker::new(&lone).check(&IFLAST, &tree, &tokens, 0, 2));

        insts[3] = Instruction::jump_abs(24, "JUMP_ABSOLUTE", 40);
        let shared = InstructionIndex::new(insts);
        assert!(ReduceChecker::new(&shared).check(&IFLAST, &tree, &tokens, 0, 2));
    }

    #[test]
    fn test_exit_jump_to_last_accepts() {
        let tree = if_tree("POP_JUMP_IF_FALSE", 25, 20);
        let index = InstructionIndex::new(vec![
            Instruction::new(10, "LOAD_NAME"),
            Instruction::jump_rel(12, "JUMP_FORWARD", 30),
            Instruction::new(20, "LOAD_NAME"),
            Instruction::new(30, "POP_TOP"),
        ]);
        // decided by the exit jump before the branch target is consulted
        assert!(!ReduceChecker::new(&index).check(&IFLAST, &tree, &window(), 0, 2));
    }

    #[test]
    fn test_unregistered_rule_accepts() {
        let index = InstructionIndex::default();
        let checker = ReduceChecker::new(&index);
        let rule = Rule::new("ifstmt", &["testexpr", "stmts"]);
        let tree = if_tree("POP_JUMP_IF_FALSE", 25, 20);
        assert!(!checker.check(&rule, &tree, &window(), 0, 2));
    }

    fn while_tree(first_stmt: Tree) -> Node {
        Node::new(
            "whileTruestmt38",
            vec![
                Tree::node("_come_froms", vec![leaf("COME_FROM", 2)]),
                Tree::node("c_stmts", vec![first_stmt]),
                leaf("JUMP_LOOP", 16),
            ],
        )
    }

    const WHILE: Rule<'static> = Rule {
        lhs: "whileTruestmt38",
        rhs: &["_come_froms", "c_stmts", "JUMP_LOOP"],
    };

    #[test]
    fn test_while_true_loop_back_to_body() {
        let index = InstructionIndex::default();
        let checker = ReduceChecker::new(&index);
        let tokens = vec![
            tok("COME_FROM", 2),
            tok("LOAD_NAME", 4),
            tok("POP_TOP", 6),
            Token::jump("JUMP_LOOP", 4, 16),
        ];
        let tree = while_tree(Tree::node(
            "expr_stmt",
            vec![leaf("LOAD_NAME", 4), leaf("POP_TOP", 6)],
        ));
        // first token (2) lies before the body's first statement (4)
        assert!(!checker.check(&WHILE, &tree, &tokens, 0, 3));
        // starting the window on the statement itself is rejected
        assert!(checker.check(&WHILE, &tree, &tokens, 1, 3));
    }

    #[test]
    fn test_while_true_nested_for_at_loop_end() {
        let index = InstructionIndex::default();
        let checker = ReduceChecker::new(&index);
        let tokens = vec![
            tok("COME_FROM", 2),
            tok("LOAD_NAME", 4),
            tok("FOR_ITER", 6),
            Token::jump("JUMP_LOOP", 2, 16),
        ];
        let tight = while_tree(Tree::node(
            "for",
            vec![leaf("LOAD_NAME", 4), leaf("JUMP_BACK", 14)],
        ));
        assert!(checker.check(&WHILE, &tight, &tokens, 0, 3));

        let loose = while_tree(Tree::node(
            "for",
            vec![leaf("LOAD_NAME", 4), leaf("JUMP_BACK", 10)],
        ));
        assert!(!checker.check(&WHILE, &loose, &tokens, 0, 3));
    }

    #[test]
    fn test_while_true_requires_jump_loop() {
        let index = InstructionIndex::default();
        let checker = ReduceChecker::new(&index);
        let tokens = vec![
            tok("COME_FROM", 2),
            tok("LOAD_NAME", 4),
            tok("POP_TOP", 6),
            tok("COME_FROM", 8),
        ];
        let tree = while_tree(Tree::node("expr_stmt", vec![leaf("LOAD_NAME", 4)]));
        assert!(checker.check(&WHILE, &tree, &tokens, 0, 3));

        let raising = vec![
            tok("COME_FROM", 2),
            tok("RAISE_VARARGS_1", 4),
            Token::jump("JUMP_LOOP", 2, 6),
        ];
        assert!(checker.check(&WHILE, &tree, &raising, 0, 2));
    }
}