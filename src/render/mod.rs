//! Tree-to-source rendering: template tables and the template engine, the
//! output state, and the handlers for constructs a flat template cannot
//! express.

pub mod class;
pub mod comp;
pub mod expr;
pub mod func;
pub mod state;
pub mod stmt;
pub mod tables;
pub mod template;
pub mod walker;

pub use state::RenderState;
pub use stmt::docstring_literal;
pub use tables::Tables;
pub use walker::SourceWalker;
