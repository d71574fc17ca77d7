//! Utility modules shared across the compiler.
//!
//! - Error types
//! - Indented text output

pub mod errors;
pub mod pretty;

pub use errors::*;
