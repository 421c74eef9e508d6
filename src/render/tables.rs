//! Static rendering tables: operator precedence and the per-kind format
//! templates, plus the per-code-object `customize` expansion.

use super::template::{Arg, MAXINT, Template};
use crate::error::TemplateError;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tracing::debug;

use Arg::{Child, Expect, ExpectPrec, Join, JoinPrec, Prec};

/// Precedence installed at the start of a render; nothing is parenthesized.
pub const NO_PARENTHESIS_EVER: i32 = 100;

/// Precedence of kinds absent from [`PRECEDENCE`].
pub const DEFAULT_PRECEDENCE: i32 = -2;

/// Binding strength per node or operator kind; larger binds looser.
pub const PRECEDENCE: &[(&str, i32)] = &[
    ("named_expr", 40),
    ("dict_unpack", 38),
    ("list_unpack", 38),
    ("yield_from", 38),
    ("tuple_list_starred", 38),
    ("unpack", 38),
    ("lambda_body", 32),
    ("_lambda_body", 30),
    ("yield", 30),
    ("if_exp", 28),
    ("if_exp_lambda", 28),
    ("if_exp_not", 28),
    ("if_exp_not_lambda", 28),
    ("or", 26),
    ("ret_or", 26),
    ("and", 24),
    ("ret_and", 24),
    ("not", 22),
    ("unary_not", 22),
    ("compare", 20),
    ("compare_single", 20),
    ("compare_chained", 20),
    ("BINARY_OR", 18),
    ("BINARY_XOR", 16),
    ("BINARY_AND", 14),
    ("BINARY_LSHIFT", 12),
    ("BINARY_RSHIFT", 12),
    ("BINARY_ADD", 10),
    ("BINARY_SUBTRACT", 10),
    ("BINARY_FLOOR_DIVIDE", 8),
    ("BINARY_MATRIX_MULTIPLY", 8),
    ("BINARY_MODULO", 8),
    ("BINARY_MULTIPLY", 8),
    ("BINARY_TRUE_DIVIDE", 8),
    ("unary_op", 6),
    ("BINARY_POWER", 4),
    ("await_expr", 3),
    ("attribute", 2),
    ("attribute37", 2),
    ("call", 2),
    ("call_kw36", 2),
    ("subscript", 2),
    ("subscript2", 2),
    ("store_subscript", 2),
    ("delete_subscript", 2),
    ("slice2", 2),
    ("slice3", 2),
    ("dict", 0),
    ("list", 0),
    ("set", 0),
    ("list_comp", 0),
    ("list_comp_async", 0),
    ("set_comp", 0),
    ("set_comp_async", 0),
    ("dict_comp", 0),
    ("dict_comp_async", 0),
    ("generator_exp", 0),
    ("generator_exp_async", 0),
];

const EXPR: &[&str] = &["expr"];
const STORE: &[&str] = &["store"];
const TESTEXPR: &[&str] = &["testexpr", "testexprc"];
const UNARY: &[&str] = &["unary_operator", "UNARY_POSITIVE", "UNARY_NEGATIVE", "UNARY_INVERT"];
const SUITE: &[&str] = &[
    "stmts",
    "c_stmts",
    "_stmts",
    "c_stmts_opt",
    "stmts_opt",
    "pass",
    "suite_stmts_opt",
    "for_block",
    "else_suite",
    "else_suitec",
    "return_if_stmts",
];

type Entry = (&'static str, &'static str, &'static [Arg]);

/// Templates keyed by the node's own kind.
const TABLE_DIRECT: &[Entry] = &[
    // ───────────────────────────── Operators ─────────────────────────────
    ("BINARY_ADD", "+", &[]),
    ("BINARY_SUBTRACT", "-", &[]),
    ("BINARY_MULTIPLY", "*", &[]),
    ("BINARY_MATRIX_MULTIPLY", "@", &[]),
    ("BINARY_TRUE_DIVIDE", "/", &[]),
    ("BINARY_FLOOR_DIVIDE", "//", &[]),
    ("BINARY_MODULO", "%%", &[]),
    ("BINARY_POWER", "**", &[]),
    ("BINARY_LSHIFT", "<<", &[]),
    ("BINARY_RSHIFT", ">>", &[]),
    ("BINARY_AND", "&", &[]),
    ("BINARY_OR", "|", &[]),
    ("BINARY_XOR", "^", &[]),
    ("INPLACE_ADD", "+=", &[]),
    ("INPLACE_SUBTRACT", "-=", &[]),
    ("INPLACE_MULTIPLY", "*=", &[]),
    ("INPLACE_MATRIX_MULTIPLY", "@=", &[]),
    ("INPLACE_TRUE_DIVIDE", "/=", &[]),
    ("INPLACE_FLOOR_DIVIDE", "//=", &[]),
    ("INPLACE_MODULO", "%%=", &[]),
    ("INPLACE_POWER", "**=", &[]),
    ("INPLACE_LSHIFT", "<<=", &[]),
    ("INPLACE_RSHIFT", ">>=", &[]),
    ("INPLACE_AND", "&=", &[]),
    ("INPLACE_OR", "|=", &[]),
    ("INPLACE_XOR", "^=", &[]),
    ("UNARY_POSITIVE", "+", &[]),
    ("UNARY_NEGATIVE", "-", &[]),
    ("UNARY_INVERT", "~", &[]),
    ("COMPARE_OP", "%{pattr_words}", &[]),
    // ────────────────────────────── Names ────────────────────────────────
    ("LOAD_STR", "%{pattr}", &[]),
    ("LOAD_NAME", "%{pattr}", &[]),
    ("LOAD_FAST", "%{pattr}", &[]),
    ("LOAD_GLOBAL", "%{pattr}", &[]),
    ("LOAD_DEREF", "%{pattr}", &[]),
    ("LOAD_CLASSDEREF", "%{pattr}", &[]),
    ("LOAD_ASSERT", "%{pattr}", &[]),
    ("LOAD_ARG", "%{pattr}", &[]),
    ("STORE_NAME", "%{pattr}", &[]),
    ("STORE_FAST", "%{pattr}", &[]),
    ("STORE_GLOBAL", "%{pattr}", &[]),
    ("STORE_DEREF", "%{pattr}", &[]),
    ("DELETE_NAME", "%|del %{pattr}\n", &[]),
    ("DELETE_FAST", "%|del %{pattr}\n", &[]),
    ("DELETE_GLOBAL", "%|del %{pattr}\n", &[]),
    ("DELETE_DEREF", "%|del %{pattr}\n", &[]),
    // ─────────────────────────── Expressions ─────────────────────────────
    ("unary_op", "%c%c", &[Expect(1, UNARY), Expect(0, EXPR)]),
    ("unary_not", "not %c", &[Child(0)]),
    ("compare", "%c", &[Child(0)]),
    ("compare_single", "%p %[-1]{pattr_words} %p", &[Prec(0, 19), Prec(1, 19)]),
    ("and", "%p and %p", &[Prec(0, 24), Prec(2, 24)]),
    ("or", "%p or %p", &[Prec(0, 26), Prec(2, 26)]),
    ("ret_and", "%p and %p", &[Prec(0, 24), Prec(2, 24)]),
    ("ret_or", "%p or %p", &[Prec(0, 26), Prec(2, 26)]),
    ("if_exp", "%p if %c else %c", &[ExpectPrec(2, EXPR, 27), Child(0), Child(4)]),
    ("if_exp_lambda", "%p if %c else %c", &[ExpectPrec(2, EXPR, 27), Child(0), Child(4)]),
    ("if_exp_not", "%p if not %p else %p", &[Prec(2, 27), Prec(0, 22), Prec(4, 27)]),
    ("named_expr", "%c := %p", &[Expect(2, STORE), ExpectPrec(0, EXPR, 39)]),
    ("await_expr", "await %c", &[Child(0)]),
    ("yield_from", "yield from %c", &[Expect(0, EXPR)]),
    ("starred", "*%c", &[Child(0)]),
    ("get_iter", "iter(%c)", &[Expect(0, EXPR)]),
    ("attribute", "%c.%[1]{pattr}", &[Expect(0, EXPR)]),
    ("attribute_w_parens", "(%p).%[1]{pattr}", &[ExpectPrec(0, EXPR, NO_PARENTHESIS_EVER)]),
    ("attribute37", "%c.%[1]{pattr}", &[Expect(0, EXPR)]),
    ("subscript", "%p[%p]", &[ExpectPrec(0, EXPR, 2), ExpectPrec(1, EXPR, NO_PARENTHESIS_EVER)]),
    ("subscript2", "%p[%p]", &[ExpectPrec(0, EXPR, 2), ExpectPrec(1, EXPR, NO_PARENTHESIS_EVER)]),
    ("store_subscript", "%p[%c]", &[ExpectPrec(0, EXPR, 2), Expect(1, EXPR)]),
    ("delete_subscript", "%|del %p[%c]\n", &[ExpectPrec(0, EXPR, 2), Expect(1, EXPR)]),
    ("build_tuple2", "%P", &[JoinPrec(0, -1, ", ", NO_PARENTHESIS_EVER)]),
    ("kwarg", "%[0]{attr}=%c", &[Child(1)]),
    ("kwargs", "%D", &[Join(0, MAXINT, ", ")]),
    ("pos_arg", "%c", &[Child(0)]),
    ("expr_pjif", "%c", &[Child(0)]),
    ("expr_pjit", "%c", &[Child(0)]),
    ("store_w_parens", "(%p).%[1]{pattr}", &[ExpectPrec(0, EXPR, NO_PARENTHESIS_EVER)]),
    ("unpack", "%C%,", &[Join(1, MAXINT, ", ")]),
    ("unpack_w_parens", "(%C%,)", &[Join(1, MAXINT, ", ")]),
    // ─────────────────────────── Comprehensions ──────────────────────────
    ("comp_body", "%c", &[Child(0)]),
    ("gen_comp_body", "%c", &[Child(0)]),
    ("set_comp_body", "%c", &[Child(0)]),
    ("dict_comp_body", "%c: %c", &[Child(0), Child(1)]),
    ("lc_body", "%c", &[Child(0)]),
    // ──────────────────────────── Statements ─────────────────────────────
    ("expr_stmt", "%|%p\n", &[Prec(0, 39)]),
    ("call_stmt", "%|%p\n", &[Prec(0, 200)]),
    ("await_stmt", "%|%c\n", &[Child(0)]),
    ("assign", "%|%c = %p\n", &[Expect(-1, STORE), Prec(0, 200)]),
    ("assign2", "%|%c, %c = %c, %c\n", &[Child(3), Child(4), Child(0), Child(1)]),
    (
        "assign3",
        "%|%c, %c, %c = %c, %c, %c\n",
        &[Child(5), Child(6), Child(7), Child(0), Child(1), Child(2)],
    ),
    ("aug_assign1", "%|%c %c %c\n", &[Child(0), Child(2), Child(1)]),
    ("aug_assign2", "%|%c.%[2]{pattr} %c %c\n", &[Child(0), Child(-3), Child(-4)]),
    ("pass", "%|pass\n", &[]),
    ("break", "%|break\n", &[]),
    ("continue", "%|continue\n", &[]),
    ("raise_stmt0", "%|raise\n", &[]),
    ("raise_stmt1", "%|raise %c\n", &[Child(0)]),
    ("raise_stmt2", "%|raise %c from %c\n", &[Child(0), Child(1)]),
    ("assert", "%|assert %c\n", &[Child(0)]),
    ("assert2", "%|assert %c, %c\n", &[Child(0), Child(3)]),
    ("import", "%|import %c\n", &[Child(2)]),
    ("import_from", "%|from %[2]{pattr} import %c\n", &[Expect(3, &["importlist"])]),
    ("import_from_star", "%|from %[2]{pattr} import *\n", &[]),
    ("importlist", "%C", &[Join(0, MAXINT, ", ")]),
    ("store_locals", "%|# inspect.currentframe().f_locals = __locals__\n", &[]),
    ("parse_error", "%|# %[0]{pattr}\n", &[]),
    // ───────────────────────────── Compound ──────────────────────────────
    ("testtrue", "not %p", &[Prec(0, 22)]),
    ("testtruec", "not %p", &[Prec(0, 22)]),
    ("testfalse", "%c", &[Child(0)]),
    ("testfalsec", "%c", &[Child(0)]),
    ("ifstmt", "%|if %c:\n%+%c%-", &[Expect(0, TESTEXPR), Expect(1, SUITE)]),
    ("iflaststmt", "%|if %c:\n%+%c%-", &[Expect(0, TESTEXPR), Expect(1, SUITE)]),
    ("iflaststmtc", "%|if %c:\n%+%c%-", &[Expect(0, TESTEXPR), Expect(1, SUITE)]),
    ("elifstmt", "%|elif %c:\n%+%c%-", &[Expect(0, TESTEXPR), Expect(1, SUITE)]),
    ("ifelsestmt", "%|if %c:\n%+%c%-%|else:\n%+%c%-", &[Child(0), Child(1), Child(3)]),
    ("ifelsestmtc", "%|if %c:\n%+%c%-%|else:\n%+%c%-", &[Child(0), Child(1), Child(3)]),
    ("elifelsestmt", "%|elif %c:\n%+%c%-%|else:\n%+%c%-", &[Child(0), Child(1), Child(3)]),
    ("ifelsestmtr", "%|if %c:\n%+%c%-%|else:\n%+%c%-", &[Child(0), Child(1), Child(2)]),
    ("ifelsestmtr2", "%|if %c:\n%+%c%-%|else:\n%+%c%-", &[Child(0), Child(1), Child(3)]),
    ("elifelsestmtr", "%|elif %c:\n%+%c%-%|else:\n%+%c%-\n\n", &[Child(0), Child(1), Child(2)]),
    ("whilestmt38", "%|while %c:\n%+%c%-\n\n", &[Expect(1, TESTEXPR), Expect(2, SUITE)]),
    ("whileTruestmt38", "%|while True:\n%+%c%-\n\n", &[Expect(1, SUITE)]),
    (
        "for38",
        "%|for %c in %c:\n%+%c%-\n\n",
        &[Expect(2, STORE), Expect(0, EXPR), Expect(3, SUITE)],
    ),
    (
        "forelsestmt38",
        "%|for %c in %c:\n%+%c%-%|else:\n%+%c%-\n\n",
        &[Expect(2, STORE), Expect(0, EXPR), Expect(3, SUITE), Expect(-1, SUITE)],
    ),
    ("try_except", "%|try:\n%+%c%-%c\n\n", &[Child(1), Child(3)]),
    ("tryfinallystmt", "%|try:\n%+%c%-%|finally:\n%+%c%-\n\n", &[Child(1), Child(-2)]),
    ("except", "%|except:\n%+%c%-", &[Child(3)]),
    ("except_cond1", "%|except %c:\n", &[Child(1)]),
    ("except_cond2", "%|except %c as %c:\n", &[Child(1), Expect(5, STORE)]),
    ("except_suite", "%+%c%-%C", &[Child(0), Join(1, MAXINT, "")]),
    ("with", "%|with %c:\n%+%c%-", &[Child(0), Child(3)]),
    ("withasstmt", "%|with %c as (%c):\n%+%c%-", &[Child(0), Child(2), Child(3)]),
    ("function_def", "\n\n%|def %c\n", &[Expect(-2, &["mkfunc"])]),
    ("async_function_def", "\n\n%|async def %c\n", &[Expect(-2, &["mkfunc"])]),
    ("function_def_deco", "\n\n%c", &[Child(0)]),
    ("mkfuncdeco", "%|@%c\n%c", &[Child(0), Child(1)]),
    ("mkfuncdeco0", "%|def %c\n", &[Child(0)]),
    ("classdefdeco", "\n\n%c", &[Child(0)]),
    ("classdefdeco1", "%|@%c\n%c", &[Child(0), Child(1)]),
];

/// Templates keyed by a descendant's kind (see [`Lookup`]).
const TABLE_R: &[Entry] = &[
    ("STORE_ATTR", "%c.%[1]{pattr}", &[Child(0)]),
    ("DELETE_ATTR", "%|del %c.%[-1]{pattr}\n", &[Child(0)]),
];

/// How the template key of a node kind is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The node's own kind.
    Direct,
    /// The kind of the child at this index.
    Descendant(isize),
}

/// Template tables for one render pass. `customize` adds entries, so each
/// pass owns its copy.
#[derive(Debug, Clone)]
pub struct Tables {
    direct: HashMap<String, Rc<Template>>,
    descendant: HashMap<String, Rc<Template>>,
    lookups: HashMap<&'static str, Lookup>,
    precedence: HashMap<&'static str, i32>,
}

impl Tables {
    pub fn new() -> Result<Self, TemplateError> {
        Ok(Self {
            direct: compile_table(TABLE_DIRECT)?,
            descendant: compile_table(TABLE_R)?,
            lookups: ["stmt", "call", "delete", "store"]
                .into_iter()
                .map(|kind| (kind, Lookup::Descendant(-1)))
                .collect(),
            precedence: PRECEDENCE.iter().copied().collect(),
        })
    }

    pub fn lookup_mode(&self, kind: &str) -> Lookup {
        self.lookups.get(kind).copied().unwrap_or(Lookup::Direct)
    }

    /// Template for a node rendered as `kind`, if any.
    pub fn lookup(&self, kind: &str, children: &[crate::lang::Tree]) -> Option<Rc<Template>> {
        match self.lookup_mode(kind) {
            Lookup::Direct => self.direct.get(kind).cloned(),
            Lookup::Descendant(index) => crate::lang::node::resolve_index(children.len(), index)
                .and_then(|i| self.descendant.get(children[i].kind()))
                .cloned(),
        }
    }

    pub fn direct(&self, kind: &str) -> Option<Rc<Template>> {
        self.direct.get(kind).cloned()
    }

    pub fn precedence(&self, kind: &str) -> i32 {
        self.precedence
            .get(kind)
            .copied()
            .unwrap_or(DEFAULT_PRECEDENCE)
    }

    /// Child assertions of a direct template, for the shape checker.
    pub fn assertions(kind: &str) -> Option<&'static [Arg]> {
        TABLE_DIRECT
            .iter()
            .find(|(key, _, _)| *key == kind)
            .map(|(_, _, args)| *args)
    }

    /// Adds call templates for the variable-arity opcodes a code object
    /// uses. Keys already present are left alone.
    pub fn customize(&mut self, customize: &BTreeMap<String, u32>) -> Result<(), TemplateError> {
        for key in customize.keys() {
            if self.descendant.contains_key(key) {
                continue;
            }
            let op = key.rfind('_').map_or(key.as_str(), |i| &key[..i]);
            let keyword_call =
                key.starts_with("CALL_METHOD") || key.starts_with("CALL_FUNCTION_KW");
            let template = if keyword_call {
                Template::compile(key, "%c(%P)", &[Child(0), JoinPrec(1, -1, ", ", 100)])?
            } else if key == "CALL_FUNCTION_EX" {
                Template::compile(key, "%c(*%c)", &[Expect(0, EXPR), Child(1)])?
            } else if key == "CALL_FUNCTION_EX_KW" {
                Template::compile(key, "%c(*%c, **%c)", &[Expect(0, EXPR), Child(1), Child(2)])?
            } else if op == "CALL_FUNCTION" {
                Template::compile(key, "%c(%P)", &[Expect(0, EXPR), JoinPrec(1, -1, ", ", 29)])?
            } else {
                continue;
            };
            debug!(key = key.as_str(), "materialized call template");
            self.descendant.insert(key.clone(), Rc::new(template));
        }
        Ok(())
    }
}

fn compile_table(entries: &[Entry]) -> Result<HashMap<String, Rc<Template>>, TemplateError> {
    entries
        .iter()
        .map(|(key, fmt, args)| {
            Template::compile(key, fmt, args).map(|t| (key.to_string(), Rc::new(t)))
        })
        .collect()
}
