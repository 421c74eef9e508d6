//! Top-level entry points: one code object in, source text out.

use crate::error::{DeparseError, Result};
use crate::lang::{CodeObject, Node};
use crate::normalize;
use crate::options::DeparseOptions;
use crate::parse::{CompileMode, GrammarParser};
use crate::render::SourceWalker;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Name the compiler gives a module body.
pub const MODULE_NAME: &str = "<module>";

/// The result of a successful render.
#[derive(Debug, Clone, PartialEq)]
pub struct Deparsed {
    pub text: String,
    /// The normalized tree the text was rendered from.
    pub tree: Node,
    /// Names stored through `STORE_GLOBAL` at the top level.
    pub globals: BTreeSet<String>,
}

/// Renders `code` using `parser` for the grammar step.
///
/// In tolerant mode shape diagnostics do not stop the render; they are
/// appended to the text as comments and the call fails with
/// [`DeparseError::Grammar`], which carries that text.
pub fn code_deparse(
    code: &CodeObject,
    parser: &mut dyn GrammarParser,
    opts: &DeparseOptions,
) -> Result<Deparsed> {
    let mut opts = opts.clone();
    let mode = opts.compile_mode;
    if mode == CompileMode::Eval {
        opts.hide_internal = false;
    }
    let is_top_level = code.name == MODULE_NAME;
    debug!(code = code.key(), ?mode, is_top_level, "deparsing");

    let built = normalize::build_tree(parser, code, mode, is_top_level, &opts)?;
    let (globals, _) = normalize::find_globals_and_nonlocals(&built.tree, code);

    let mut walker = SourceWalker::new(parser, opts)?;
    walker.state.scope_mut().is_lambda = mode.is_lambda();
    for diagnostic in built.diagnostics {
        walker.record(diagnostic);
    }
    walker.gen_source(&built.tree, code)?;
    for name in &globals {
        walker.write(&format!("# global {} ## Warning: Unused global\n", name));
    }

    let diagnostics = walker.diagnostics().to_vec();
    let mut text = walker.into_text();
    if !diagnostics.is_empty() {
        text.push_str("# NOTE: have internal decompilation grammar errors.\n");
        for diagnostic in &diagnostics {
            text.push_str("#   ");
            text.push_str(diagnostic);
            text.push('\n');
        }
        return Err(DeparseError::Grammar { diagnostics, partial: text });
    }

    info!(code = code.key(), bytes = text.len(), "deparsed");
    Ok(Deparsed { text, tree: built.tree, globals })
}

/// [`code_deparse`] for callers that only want the text.
pub fn deparse_to_string(
    code: &CodeObject,
    parser: &mut dyn GrammarParser,
    opts: &DeparseOptions,
) -> Result<String> {
    code_deparse(code, parser, opts).map(|d| d.text)
}
