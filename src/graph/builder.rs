//! Convenience construction of programs, mainly for the mapping layer and tests.

use crate::graph::attr::Attrs;
use crate::graph::instruction::{ops, Device, Instruction};
use crate::graph::program::Program;
use crate::graph::variable::{DataType, VarId, Variable};
use crate::utils::errors::CompileResult;

/// Builds a [`Program`] instruction by instruction.
///
/// Output shapes of the known ops are inferred; element types follow the
/// first input.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
    device: Device,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device tag for instructions appended from now on.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn input(&mut self, name: &str, shape: Vec<usize>, dtype: DataType) -> CompileResult<VarId> {
        self.program.add_input(Variable::new(name, shape, dtype))
    }

    /// Append an arbitrary instruction with explicit output shapes.
    pub fn append(
        &mut self,
        op_type: &str,
        inputs: &[VarId],
        outputs: &[(&str, Vec<usize>)],
        attrs: Attrs,
    ) -> CompileResult<Vec<VarId>> {
        let dtype = inputs
            .first()
            .map(|&v| self.program.var(v).dtype)
            .unwrap_or_default();
        let mut out_ids = Vec::with_capacity(outputs.len());
        for (name, shape) in outputs {
            out_ids.push(self.program.declare(Variable::new(*name, shape.clone(), dtype))?);
        }
        let instr = Instruction::new(op_type, inputs.to_vec(), out_ids.clone())
            .with_attrs(attrs)
            .with_device(self.device);
        self.program.push(instr);
        Ok(out_ids)
    }

    fn unary(&mut self, op_type: &str, x: VarId, out: &str, attrs: Attrs) -> CompileResult<VarId> {
        let shape = self.program.var(x).shape.clone();
        Ok(self.append(op_type, &[x], &[(out, shape)], attrs)?[0])
    }

    fn binary(&mut self, op_type: &str, x: VarId, y: VarId, out: &str) -> CompileResult<VarId> {
        let shape = self.program.var(x).shape.clone();
        Ok(self.append(op_type, &[x, y], &[(out, shape)], Attrs::new())?[0])
    }

    pub fn matmul(&mut self, a: VarId, b: VarId, out: &str) -> CompileResult<VarId> {
        self.matmul_t(a, b, false, false, out)
    }

    /// Matrix product with optional operand transposition.
    pub fn matmul_t(&mut self, a: VarId, b: VarId, trans_a: bool, trans_b: bool, out: &str) -> CompileResult<VarId> {
        let rows = |shape: &[usize], trans: bool| {
            let n = shape.len();
            if n < 2 { shape.first().copied().unwrap_or(1) } else if trans { shape[n - 1] } else { shape[n - 2] }
        };
        let cols = |shape: &[usize], trans: bool| {
            let n = shape.len();
            if n < 2 { 1 } else if trans { shape[n - 2] } else { shape[n - 1] }
        };
        let shape = vec![
            rows(&self.program.var(a).shape, trans_a),
            cols(&self.program.var(b).shape, trans_b),
        ];
        let mut attrs = Attrs::new();
        if trans_a {
            attrs.set("trans_a", true);
        }
        if trans_b {
            attrs.set("trans_b", true);
        }
        Ok(self.append(ops::MATMUL, &[a, b], &[(out, shape)], attrs)?[0])
    }

    pub fn add(&mut self, x: VarId, y: VarId, out: &str) -> CompileResult<VarId> {
        self.binary(ops::ELEMENTWISE_ADD, x, y, out)
    }

    pub fn sub(&mut self, x: VarId, y: VarId, out: &str) -> CompileResult<VarId> {
        self.binary(ops::SUB, x, y, out)
    }

    pub fn mul(&mut self, x: VarId, y: VarId, out: &str) -> CompileResult<VarId> {
        self.binary(ops::MUL, x, y, out)
    }

    pub fn relu(&mut self, x: VarId, out: &str) -> CompileResult<VarId> {
        self.unary(ops::RELU, x, out, Attrs::new())
    }

    pub fn identity(&mut self, x: VarId, out: &str) -> CompileResult<VarId> {
        self.unary(ops::IDENTITY, x, out, Attrs::new())
    }

    pub fn transpose(&mut self, x: VarId, perm: Vec<i64>, out: &str) -> CompileResult<VarId> {
        let src = self.program.var(x).shape.clone();
        let shape = perm
            .iter()
            .map(|&p| src.get(p as usize).copied().unwrap_or(1))
            .collect();
        let attrs = Attrs::new().with("axis", perm);
        Ok(self.append(ops::TRANSPOSE, &[x], &[(out, shape)], attrs)?[0])
    }

    /// Read-only view of what has been built so far.
    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn build(self) -> Program {
        self.program
    }
}
