use super::code::CodeObject;
use serde::{Deserialize, Serialize};

/// Operand value carried by an instruction or a terminal token.
///
/// Mirrors the constants a stack-machine code object can hold: scalars,
/// strings, nested tuples and whole nested code objects (function bodies,
/// lambdas, comprehensions, class bodies).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    /// The `None` constant, also used for "no operand".
    #[default]
    None,

    Bool(bool),

    /// 64-bit signed integer. Jump targets are stored as `Int` offsets.
    Int(i64),

    Float(f64),

    /// Complex literal `(real, imag)`.
    Complex(f64, f64),

    Str(String),

    Bytes(Vec<u8>),

    Ellipsis,

    Tuple(Vec<Value>),

    FrozenSet(Vec<Value>),

    /// A nested code object.
    Code(Box<CodeObject>),
}

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Interprets the value as a byte offset (jump targets).
    pub fn as_offset(&self) -> Option<usize> {
        match self {
            Value::Int(n) if *n >= 0 => Some(*n as usize),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_code(&self) -> Option<&CodeObject> {
        match self {
            Value::Code(code) => Some(code),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Source-level representation (what `repr()` would print).
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => float_repr(*f),
            Value::Complex(re, im) => complex_repr(*re, *im),
            Value::Str(s) => str_repr(s),
            Value::Bytes(b) => bytes_repr(b),
            Value::Ellipsis => "...".to_string(),
            Value::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                if items.len() == 1 {
                    format!("({},)", inner[0])
                } else {
                    format!("({})", inner.join(", "))
                }
            }
            Value::FrozenSet(items) => {
                if items.is_empty() {
                    "frozenset()".to_string()
                } else {
                    let inner: Vec<String> = items.iter().map(Value::repr).collect();
                    format!("frozenset({{{}}})", inner.join(", "))
                }
            }
            Value::Code(code) => format!("<code object {}>", code.name),
        }
    }
}

impl std::fmt::Display for Value {
    /// Raw display: strings print without quotes, everything else as `repr`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.repr()),
        }
    }
}

/// Shortest round-trip float text in source syntax.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "float('nan')".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 {
            "float('inf')".to_string()
        } else {
            "float('-inf')".to_string()
        };
    }
    let text = format!("{:?}", f);
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa.trim_end_matches(".0"), sign, digits)
        }
        None => text,
    }
}

fn complex_repr(re: f64, im: f64) -> String {
    let imag = format!("{}j", float_repr(im).trim_end_matches(".0"));
    if re == 0.0 && re.is_sign_positive() {
        imag
    } else {
        let real = float_repr(re);
        let real = real.trim_end_matches(".0");
        if im < 0.0 || (im == 0.0 && im.is_sign_negative()) {
            format!("({}{})", real, imag)
        } else {
            format!("({}+{})", real, imag)
        }
    }
}

/// Quotes a string the way the source language's `repr` does: single quotes
/// unless the text holds a single quote and no double quote.
pub fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

pub fn bytes_repr(b: &[u8]) -> String {
    let quote = if b.contains(&b'\'') && !b.contains(&b'"') {
        b'"'
    } else {
        b'\''
    };
    let mut out = String::from("b");
    out.push(quote as char);
    for &byte in b {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            q if q == quote => {
                out.push('\\');
                out.push(q as char);
            }
            0x20..=0x7e => out.push(byte as char),
            _ => out.push_str(&format!("\\x{:02x}", byte)),
        }
    }
    out.push(quote as char);
    out
}
