use super::token::Token;
use crate::bytecode::InstructionIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One compiled unit: a module body, function, lambda, comprehension, or
/// class body, together with its scanned token stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CodeObject {
    /// `co_name`: `<module>`, `<lambda>`, `<listcomp>`, a function name...
    pub name: String,
    /// Dotted qualified name; distinguishes sibling lambdas and comprehensions.
    pub qualname: String,
    pub filename: String,
    pub first_line: u32,
    pub flags: u32,

    pub argcount: u32,
    pub posonly_argcount: u32,
    pub kwonly_argcount: u32,
    /// Local variable names; arguments come first.
    pub varnames: Vec<String>,
    pub freevars: Vec<String>,
    pub cellvars: Vec<String>,
    /// Global and attribute names referenced by the code.
    pub names: Vec<String>,

    /// Leading string constant, when the body starts with a docstring.
    pub docstring: Option<String>,

    /// Scanner output: the terminals handed to the grammar parser.
    pub tokens: Vec<Token>,
    /// Variable-arity opcodes seen while scanning, with their argument counts.
    pub customize: BTreeMap<String, u32>,
    pub instructions: InstructionIndex,
}

impl CodeObject {
    pub const OPTIMIZED: u32 = 0x0001;
    pub const NEWLOCALS: u32 = 0x0002;
    pub const VARARGS: u32 = 0x0004;
    pub const VARKEYWORDS: u32 = 0x0008;
    pub const NESTED: u32 = 0x0010;
    pub const GENERATOR: u32 = 0x0020;
    pub const COROUTINE: u32 = 0x0080;
    pub const ITERABLE_COROUTINE: u32 = 0x0100;
    pub const ASYNC_GENERATOR: u32 = 0x0200;

    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            qualname: name.clone(),
            name,
            ..Self::default()
        }
    }

    pub fn with_tokens(mut self, tokens: Vec<Token>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_qualname(mut self, qualname: impl Into<String>) -> Self {
        self.qualname = qualname.into();
        self
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn is_lambda(&self) -> bool {
        self.name == "<lambda>"
    }

    pub fn is_async(&self) -> bool {
        self.has_flag(Self::COROUTINE | Self::ASYNC_GENERATOR | Self::ITERABLE_COROUTINE)
    }

    /// Key used to look up a recorded parse tree.
    pub fn key(&self) -> &str {
        if self.qualname.is_empty() {
            &self.name
        } else {
            &self.qualname
        }
    }

    /// Nested code objects held as constants in the token stream, in order.
    pub fn nested(&self) -> impl Iterator<Item = &CodeObject> {
        self.tokens.iter().filter_map(|t| t.attr.as_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::value::Value;

    #[test]
    fn test_flags() {
        let mut code = CodeObject::new("f");
        code.flags = CodeObject::VARARGS | CodeObject::COROUTINE;
        assert!(code.has_flag(CodeObject::VARARGS));
        assert!(!code.has_flag(CodeObject::VARKEYWORDS));
        assert!(code.is_async());
    }

    #[test]
    fn test_key_prefers_qualname() {
        let code = CodeObject::new("<lambda>").with_qualname("f.<locals>.<lambda>");
        assert_eq!(code.key(), "f.<locals>.<lambda>");
        let mut bare = CodeObject::new("<module>");
        bare.qualname.clear();
        assert_eq!(bare.key(), "<module>");
    }

    #[test]
    fn test_nested_code_objects() {
        let inner = CodeObject::new("g");
        let code = CodeObject::new("<module>").with_tokens(vec![
            Token::constant("LOAD_CODE", Value::Code(Box::new(inner)), 0),
            Token::constant("LOAD_STR", Value::Str("g".into()), 2),
        ]);
        let names: Vec<&str> = code.nested().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["g"]);
    }
}