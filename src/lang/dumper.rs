use super::code::CodeObject;
use super::token::Token;
use std::fmt::Write;

/// Prints the scanner token stream of a code object, one token per line.
pub struct TokenDumper {
    pub color: bool,
    pub show_attr: bool, // if true, prints the raw operand next to the pretty one
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_attr: false,
        }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn with_attr(mut self) -> Self {
        self.show_attr = true;
        self
    }

    pub fn dump(&self, code: &CodeObject) {
        print!("{}", self.dump_to_string(code));
    }

    /// Dumps `code` and then every nested code object, depth first.
    pub fn dump_to_string(&self, code: &CodeObject) -> String {
        let mut out = String::new();
        self.dump_code(code, &mut out);
        out
    }

    fn dump_code(&self, code: &CodeObject, out: &mut String) {
        let _ = writeln!(out, "# {} ({} tokens)", code.key(), code.tokens.len());
        for token in &code.tokens {
            self.print_one(token, out);
        }
        for nested in code.nested() {
            out.push('\n');
            self.dump_code(nested, out);
        }
    }

    fn print_one(&self, t: &Token, out: &mut String) {
        let colr = if self.color { self.color(t) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };
        let line = match t.line_start {
            Some(l) => format!("{:>4}", l),
            None => "    ".to_string(),
        };

        let _ = write!(
            out,
            "[{}:{:04}] {}{:<7} {}",
            line,
            t.offset,
            colr,
            Self::category(t),
            t.kind
        );
        if !t.pattr.is_empty() {
            let _ = write!(out, " {}", t.pattr);
        }
        if self.show_attr {
            let _ = write!(out, " {:?}", t.attr);
        }
        let _ = writeln!(out, "{}", reset);
    }

    fn category(t: &Token) -> &'static str {
        let kind = t.kind.as_str();
        if kind.starts_with("COME_FROM") || kind.ends_with("_MARKER") || kind == "RETURN_LAST" {
            "MARKER"
        } else if kind.contains("JUMP") {
            "JUMP"
        } else if kind.starts_with("LOAD_") {
            "LOAD"
        } else if kind.starts_with("STORE_") || kind.starts_with("DELETE_") {
            "STORE"
        } else if kind.starts_with("CALL_") || kind.starts_with("MAKE_FUNCTION") {
            "CALL"
        } else if kind.starts_with("BUILD_") || kind.starts_with("UNPACK_") {
            "BUILD"
        } else {
            "OP"
        }
    }

    fn color(&self, t: &Token) -> &'static str {
        match Self::category(t) {
            "MARKER" => Self::DIM,
            "JUMP" => Self::MAG,
            "LOAD" if t.attr.as_str().is_some() && t.pattr.starts_with(['\'', '"']) => Self::GRN,
            "LOAD" => Self::CYN,
            "STORE" => Self::YEL,
            _ => Self::RESET,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::value::Value;

    #[test]
    fn test_dump_plain() {
        let code = CodeObject::new("<module>").with_tokens(vec![
            Token::name("LOAD_NAME", "x", 0).with_line(1),
            Token::name("STORE_NAME", "y", 2),
            Token::jump("JUMP_FORWARD", 8, 4),
        ]);
        let text = TokenDumper::new().no_color().dump_to_string(&code);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# <module> (3 tokens)");
        assert_eq!(lines[1], "[   1:0000] LOAD    LOAD_NAME x");
        assert_eq!(lines[2], "[    :0002] STORE   STORE_NAME y");
        assert_eq!(lines[3], "[    :0004] JUMP    JUMP_FORWARD 8");
    }

    #[test]
    fn test_dump_recurses_into_nested_code() {
        let inner = CodeObject::new("f").with_tokens(vec![Token::new("RETURN_VALUE", 0)]);
        let code = CodeObject::new("<module>").with_tokens(vec![Token::constant(
            "LOAD_CODE",
            Value::Code(Box::new(inner)),
            0,
        )]);
        let text = TokenDumper::new().no_color().dump_to_string(&code);
        assert!(text.contains("# f (1 tokens)"));
        assert!(text.contains("RETURN_VALUE"));
    }
}