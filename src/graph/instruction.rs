//! Operator applications.

use crate::graph::attr::Attrs;
use crate::graph::variable::VarId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Op type tags understood by the builtin passes.
pub mod ops {
    pub const MATMUL: &str = "matmul";
    pub const ELEMENTWISE_ADD: &str = "elementwise_add";
    pub const IDENTITY: &str = "identity";
    pub const RELU: &str = "relu";
    pub const TRANSPOSE: &str = "transpose";
    pub const SUB: &str = "elementwise_sub";
    pub const MUL: &str = "elementwise_mul";
    /// matmul followed by a bias add
    pub const FUSED_GEMM: &str = "fused_gemm";
}

/// `(inputs, outputs)` for ops with a fixed signature.
///
/// Ops not listed here are opaque and are not arity-checked.
pub fn signature(op_type: &str) -> Option<(usize, usize)> {
    match op_type {
        ops::MATMUL | ops::ELEMENTWISE_ADD | ops::SUB | ops::MUL => Some((2, 1)),
        ops::IDENTITY | ops::RELU | ops::TRANSPOSE => Some((1, 1)),
        ops::FUSED_GEMM => Some((3, 1)),
        _ => None,
    }
}

/// Device affinity of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Any,
    Host,
    Gpu,
}

/// One operator application.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op_type: String,
    pub inputs: Vec<VarId>,
    pub outputs: Vec<VarId>,
    pub attrs: Attrs,
    pub device: Device,
}

impl Instruction {
    pub fn new(op_type: impl Into<String>, inputs: Vec<VarId>, outputs: Vec<VarId>) -> Self {
        Self {
            op_type: op_type.into(),
            inputs,
            outputs,
            attrs: Attrs::new(),
            device: Device::Any,
        }
    }

    pub fn with_attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn is(&self, op_type: &str) -> bool {
        self.op_type == op_type
    }

    /// Whether operand counts agree with the op's known signature.
    pub fn arity_ok(&self) -> bool {
        match signature(&self.op_type) {
            Some((n_in, n_out)) => self.inputs.len() == n_in && self.outputs.len() == n_out,
            None => true,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Any => write!(f, "any"),
            Device::Host => write!(f, "host"),
            Device::Gpu => write!(f, "gpu"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity() {
        let ok = Instruction::new(ops::MATMUL, vec![VarId(0), VarId(1)], vec![VarId(2)]);
        assert!(ok.arity_ok());
        let bad = Instruction::new(ops::ELEMENTWISE_ADD, vec![VarId(0)], vec![VarId(2)]);
        assert!(!bad.arity_ok());
        let opaque = Instruction::new("custom_call", vec![], vec![VarId(2), VarId(3)]);
        assert!(opaque.arity_ok());
    }
}
