//! Bridge from generated ASTs to the compiler's expression tree.
//!
//! Integer division keeps floor semantics throughout: `FloorDiv` stays
//! `FloorDiv`, and ceiling division is rewritten in terms of it.

pub mod convert;
pub mod expr;

pub use convert::ExprBridge;
pub use expr::{CmpOp, Expr, LoopRange};
