//! Tensor values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a variable inside its program's arena.
///
/// Two arena entries may carry the same string id (a rewrite superseding a
/// value), but they are distinct values: a reference to the old entry is
/// not a reference to the new one until a substitution says so.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl VarId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Float32,
    Float16,
    Float64,
    Int32,
    Int64,
    Bool,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Float32 => "float32",
            DataType::Float16 => "float16",
            DataType::Float64 => "float64",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Bool => "bool",
        };
        write!(f, "{}", s)
    }
}

/// A single-assignment tensor value.
///
/// The producing instruction is not stored here; it is derived on demand
/// (see [`crate::pass::DefUse`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub id: String,
    pub shape: Vec<usize>,
    #[serde(default)]
    pub dtype: DataType,
}

impl Variable {
    pub fn new(id: impl Into<String>, shape: Vec<usize>, dtype: DataType) -> Self {
        Self { id: id.into(), shape, dtype }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}{:?}", self.id, self.dtype, self.shape)
    }
}
