use super::reducecheck::ReduceChecker;
use crate::lang::{CodeObject, Node, Token};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A grammar production `lhs ::= rhs...`, as handed to reduction checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule<'a> {
    pub lhs: &'a str,
    pub rhs: &'a [&'a str],
}

impl<'a> Rule<'a> {
    pub fn new(lhs: &'a str, rhs: &'a [&'a str]) -> Self {
        Self { lhs, rhs }
    }

    pub fn rhs_is(&self, rhs: &[&str]) -> bool {
        self.rhs == rhs
    }
}

impl fmt::Display for Rule<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ::= {}", self.lhs, self.rhs.join(" "))
    }
}

/// What kind of source a code object is decompiled as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompileMode {
    /// Module or function body.
    #[default]
    Exec,
    /// One interactive statement.
    Single,
    /// A bare expression.
    Eval,
    /// The body of a lambda.
    Lambda,
}

impl CompileMode {
    /// Grammar start symbol the parse tree root must carry.
    pub fn start_symbol(self) -> &'static str {
        match self {
            CompileMode::Exec => "stmts",
            CompileMode::Single => "single_start",
            CompileMode::Eval => "expr_start",
            CompileMode::Lambda => "lambda_start",
        }
    }

    pub fn is_lambda(self) -> bool {
        self == CompileMode::Lambda
    }
}

impl std::str::FromStr for CompileMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exec" => Ok(CompileMode::Exec),
            "single" => Ok(CompileMode::Single),
            "eval" => Ok(CompileMode::Eval),
            "lambda" => Ok(CompileMode::Lambda),
            other => Err(format!("unknown compile mode '{}'", other)),
        }
    }
}

/// The parser could not reduce a token stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub message: String,
    /// Printable tokens around the failure point.
    pub window: Vec<String>,
    /// Reduction trace, present when parser debugging is on.
    pub trace: Vec<String>,
}

impl ParseFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            window: Vec::new(),
            trace: Vec::new(),
        }
    }

    /// Records up to `radius` tokens on each side of `at`.
    pub fn with_window(mut self, tokens: &[Token], at: usize, radius: usize) -> Self {
        let lo = at.saturating_sub(radius);
        let hi = (at + radius + 1).min(tokens.len());
        self.window = tokens[lo.min(hi)..hi].iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.trace = trace;
        self
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        for line in &self.window {
            write!(f, "\n    {}", line)?;
        }
        if !self.trace.is_empty() {
            write!(f, "\n  reductions:")?;
            for line in &self.trace {
                write!(f, "\n    {}", line)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ParseFailure {}

/// The external grammar engine.
///
/// Implementations reduce `tokens` (already normalized for `mode`) to a tree
/// rooted at `mode.start_symbol()`, consulting `checker` on the rules it
/// gates. `code` supplies the customize table and nested constants.
pub trait GrammarParser {
    fn parse(
        &mut self,
        code: &CodeObject,
        tokens: &[Token],
        mode: CompileMode,
        checker: &ReduceChecker<'_>,
    ) -> Result<Node, ParseFailure>;
}
