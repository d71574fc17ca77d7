//! Lowering of polyhedral stages into loop-nest ASTs.

pub mod ast;
pub mod options;
pub mod scanner;
pub mod ast_builder;

pub use ast::{AstBinOp, AstExpr, AstNode, LoopOrigin};
pub use options::{BuildOptions, LoopKind};
pub use ast_builder::AstBuilder;
