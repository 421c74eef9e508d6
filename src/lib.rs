//! Source reconstruction for stack-machine bytecode.
//!
//! A scanner produces tokens per code object, a grammar parser (behind
//! [`parse::GrammarParser`]) turns them into trees, the reduction checks in
//! [`parse::reducecheck`] veto ambiguous reductions, and the renderer in
//! [`render`] turns the trees back into source text.

pub mod bundle;
pub mod bytecode;
pub mod deparse;
pub mod error;
pub mod lang;
pub mod normalize;
pub mod options;
pub mod parse;
pub mod render;

pub use bundle::Bundle;
pub use deparse::{Deparsed, code_deparse, deparse_to_string};
pub use error::{DeparseError, Result};
pub use options::DeparseOptions;
