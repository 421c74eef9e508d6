//! The seam to the grammar engine: rules, the parser trait, reduction
//! checks, and a replaying parser for recorded trees.

pub mod grammar;
pub mod reducecheck;
pub mod replay;

pub use grammar::{CompileMode, GrammarParser, ParseFailure, Rule};
pub use reducecheck::ReduceChecker;
pub use replay::ReplayParser;