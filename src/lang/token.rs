use super::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A terminal of the grammar: one (possibly synthetic) instruction.
///
/// `kind` is the grammar terminal name. It is usually the opcode name but
/// can be a synthetic marker such as `COME_FROM`, `RETURN_LAST`, or a
/// specialized name like `CALL_FUNCTION_2`. `pattr` is the pretty operand:
/// already-quoted for string constants, the bare name for name operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: String,
    pub attr: Value,
    pub pattr: String,
    pub offset: usize,
    pub line_start: Option<u32>,
}

impl Token {
    pub fn new(kind: impl Into<String>, offset: usize) -> Self {
        Self {
            kind: kind.into(),
            attr: Value::None,
            pattr: String::new(),
            offset,
            line_start: None,
        }
    }

    /// Token carrying a name operand (`LOAD_NAME x`, `STORE_FAST y`).
    pub fn name(kind: impl Into<String>, name: &str, offset: usize) -> Self {
        Self {
            attr: Value::Str(name.to_string()),
            pattr: name.to_string(),
            ..Self::new(kind, offset)
        }
    }

    /// Token carrying a constant; `pattr` becomes the constant's `repr`.
    pub fn constant(kind: impl Into<String>, value: Value, offset: usize) -> Self {
        Self {
            pattr: value.repr(),
            attr: value,
            ..Self::new(kind, offset)
        }
    }

    /// Jump-like token whose operand is a target offset.
    pub fn jump(kind: impl Into<String>, target: usize, offset: usize) -> Self {
        Self {
            attr: Value::Int(target as i64),
            pattr: target.to_string(),
            ..Self::new(kind, offset)
        }
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line_start = Some(line);
        self
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    pub fn jump_target(&self) -> Option<usize> {
        self.attr.as_offset()
    }

    /// Backward loop jumps.
    pub fn is_loop_jump(&self) -> bool {
        matches!(self.kind.as_str(), "JUMP_BACK" | "JUMP_LOOP")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line_start {
            Some(line) => write!(f, "L.{:>4} ", line)?,
            None => write!(f, "       ")?,
        }
        write!(f, "{:>6}  {}", self.offset, self.kind)?;
        if !self.pattr.is_empty() {
            write!(f, " {}", self.pattr)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_token_quotes_strings() {
        let t = Token::constant("LOAD_STR", Value::Str("hi".into()), 4);
        assert_eq!(t.pattr, "'hi'");
        assert_eq!(t.attr.as_str(), Some("hi"));
    }

    #[test]
    fn test_jump_target() {
        let t = Token::jump("POP_JUMP_IF_FALSE", 25, 12);
        assert_eq!(t.jump_target(), Some(25));
        assert!(!t.is_loop_jump());
        assert!(Token::jump("JUMP_BACK", 0, 30).is_loop_jump());
    }

    #[test]
    fn test_display() {
        let t = Token::name("LOAD_NAME", "x", 2).with_line(7);
        assert_eq!(t.to_string(), "L.   7      2  LOAD_NAME x");
    }
}