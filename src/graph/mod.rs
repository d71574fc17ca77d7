//! Graph model: programs, instructions and variables.
//!
//! A [`Program`] owns an arena of [`Variable`]s addressed by [`VarId`] and an
//! ordered list of [`Instruction`]s. Producer and consumer relations are not
//! stored; passes derive them when needed.

pub mod attr;
pub mod builder;
pub mod desc;
pub mod instruction;
pub mod program;
pub mod variable;

pub use attr::{AttrValue, Attrs};
pub use builder::ProgramBuilder;
pub use desc::{InstructionDesc, ProgramDesc};
pub use instruction::{ops, signature, Device, Instruction};
pub use program::Program;
pub use variable::{DataType, VarId, Variable};
