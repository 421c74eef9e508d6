//! # Decompiler data model
//!
//! Operand values, terminals (tokens), parse trees and code objects. The
//! scanner produces tokens and an instruction index per code object; the
//! grammar parser turns the tokens into a [`node::Node`] tree which the
//! renderer walks.
//!
//! ## Conventions
//!
//! - Child indexes may be negative and then count from the end, so `-1` is
//!   the last child.
//! - Trees are never mutated after parsing; rewrites build new nodes.

pub mod code;
pub mod dumper;
pub mod node;
pub mod token;
pub mod value;

pub use code::CodeObject;
pub use node::{Node, Tree};
pub use token::Token;
pub use value::Value;