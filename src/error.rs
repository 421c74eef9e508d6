use crate::parse::ParseFailure;
use thiserror::Error;

/// Everything that can stop a render.
#[derive(Debug, Error)]
pub enum DeparseError {
    /// A node does not have the shape its template asserts.
    #[error("template assertion failed for '{kind}': expected {expected}, found {found}")]
    Template {
        kind: String,
        expected: String,
        found: String,
    },

    #[error("parse error: {0}")]
    Parse(#[from] ParseFailure),

    /// The render finished but collected grammar diagnostics.
    #[error("decompilation finished with {} grammar error(s)", .diagnostics.len())]
    Grammar {
        diagnostics: Vec<String>,
        /// Best-effort text with the diagnostic comments appended.
        partial: String,
    },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("malformed template table: {0}")]
    Table(#[from] TemplateError),

    #[error("bundle error: {0}")]
    Bundle(#[from] postcard::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeparseError {
    pub fn internal(msg: impl Into<String>) -> Self {
        DeparseError::Internal(msg.into())
    }

    pub fn template(
        kind: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        DeparseError::Template {
            kind: kind.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Partial output carried by a grammar failure.
    pub fn partial(&self) -> Option<&str> {
        match self {
            DeparseError::Grammar { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

/// A template definition that does not match its argument list.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("template for '{key}' uses {used} argument(s) but {given} were given")]
    ArgCount {
        key: String,
        used: usize,
        given: usize,
    },

    #[error("template for '{key}': marker '%{marker}' cannot take argument {index}")]
    ArgKind {
        key: String,
        marker: char,
        index: usize,
    },

    #[error("template for '{key}': unknown marker '%{marker}'")]
    UnknownMarker { key: String, marker: char },

    #[error("template for '{key}': unknown expression '{expr}'")]
    UnknownExpr { key: String, expr: String },

    #[error("template for '{key}' is truncated")]
    Truncated { key: String },
}

pub type Result<T> = std::result::Result<T, DeparseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_message() {
        let err = DeparseError::template("ifstmt", "child 1 of kind stmts", "c_stmts");
        assert_eq!(
            err.to_string(),
            "template assertion failed for 'ifstmt': expected child 1 of kind stmts, found c_stmts"
        );
    }

    #[test]
    fn test_grammar_partial() {
        let err = DeparseError::Grammar {
            diagnostics: vec!["a".into(), "b".into()],
            partial: "x = 1\n".into(),
        };
        assert_eq!(err.to_string(), "decompilation finished with 2 grammar error(s)");
        assert_eq!(err.partial(), Some("x = 1\n"));
        assert_eq!(DeparseError::internal("boom").partial(), None);
    }

    #[test]
    fn test_parse_failure_converts() {
        let err: DeparseError = ParseFailure::new("no rule for CALL_FUNCTION_9").into();
        assert_eq!(err.to_string(), "parse error: no rule for CALL_FUNCTION_9");
    }
}