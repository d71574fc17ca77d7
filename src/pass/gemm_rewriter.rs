//! Fuse `elementwise_add(matmul(a, b), bias)` into one `fused_gemm`.
//!
//! Only applied for GPU targets, where the fused form maps to a single
//! library call.

use crate::graph::{ops, Attrs, Instruction, Program, VarId};
use crate::pass::{Arch, PassContext, ProgramPass, Rewrite, Target};
use crate::utils::errors::{CompileResult, ConfigError, ConfigErrorKind};
use log::{debug, trace};
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct GemmRewriter;

/// An accepted fusion for one add instruction.
struct Candidate {
    matmul: usize,
    bias: VarId,
    trans_a: bool,
    trans_b: bool,
}

impl GemmRewriter {
    pub const NAME: &'static str = "gemm_rewriter";

    pub fn new() -> Self {
        Self
    }

    /// Find the matmul operand of `add` that may be absorbed.
    ///
    /// Operands are tried left to right; the first eligible one wins. The
    /// producer must be a live matmul whose output has exactly one reader
    /// and is not fetched.
    fn match_add(
        &self,
        program: &Program,
        add_index: usize,
        ctx: &PassContext<'_>,
        removed: &HashSet<usize>,
    ) -> CompileResult<Option<Candidate>> {
        let add = &program.instructions()[add_index];
        if add.inputs.len() != 2 {
            return Err(ConfigError::new(
                ConfigErrorKind::Arity,
                format!(
                    "`{}` at {} has {} input(s); the gemm pattern needs exactly 2",
                    add.op_type,
                    add_index,
                    add.inputs.len()
                ),
            )
            .into());
        }
        for (slot, &operand) in add.inputs.iter().enumerate() {
            let Some(producer) = ctx.def_use.producer_of(operand) else {
                continue;
            };
            let matmul = &program.instructions()[producer];
            if !matmul.is(ops::MATMUL) || removed.contains(&producer) {
                continue;
            }
            if ctx.def_use.use_count(operand) != 1 || ctx.is_fetch(program, operand) {
                trace!(
                    "{}: `{}` has {} reader(s) or is fetched, not fusing",
                    Self::NAME,
                    program.name(operand),
                    ctx.def_use.use_count(operand)
                );
                continue;
            }
            return Ok(Some(Candidate {
                matmul: producer,
                bias: add.inputs[1 - slot],
                trans_a: matmul.attrs.get_bool_or("trans_a", false)?,
                trans_b: matmul.attrs.get_bool_or("trans_b", false)?,
            }));
        }
        Ok(None)
    }
}

impl ProgramPass for GemmRewriter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn applies_to(&self, target: &Target) -> bool {
        target.arch == Arch::NvGpu
    }

    fn run(&self, program: &Program, ctx: &PassContext<'_>) -> CompileResult<Rewrite> {
        if program.is_empty() {
            return Ok(Rewrite::unchanged(program));
        }

        let n = program.len();
        let mut removed: HashSet<usize> = HashSet::new();
        let mut fused: Vec<Option<Candidate>> = (0..n).map(|_| None).collect();

        // Consumers first: absorbing a producer removes it entirely.
        for index in (0..n).rev() {
            if !program.instructions()[index].is(ops::ELEMENTWISE_ADD) {
                continue;
            }
            if let Some(candidate) = self.match_add(program, index, ctx, &removed)? {
                removed.insert(candidate.matmul);
                removed.insert(index);
                fused[index] = Some(candidate);
            }
        }

        let mut rewrite = Rewrite::new(program.with_same_arena());
        for (index, instr) in program.instructions().iter().enumerate() {
            if let Some(candidate) = &fused[index] {
                let matmul = &program.instructions()[candidate.matmul];
                let mut inputs = matmul.inputs.clone();
                inputs.push(candidate.bias);
                let old_out = instr.outputs[0];
                let new_out = rewrite.program.supersede(old_out);
                debug!(
                    "{}: fused `{}` = matmul({}) + `{}` (trans_a={}, trans_b={})",
                    Self::NAME,
                    program.name(old_out),
                    matmul.inputs.iter().map(|&v| program.name(v)).collect::<Vec<_>>().join(", "),
                    program.name(candidate.bias),
                    candidate.trans_a,
                    candidate.trans_b
                );
                let attrs = Attrs::new()
                    .with("trans_a", candidate.trans_a)
                    .with("trans_b", candidate.trans_b);
                rewrite.program.push(
                    Instruction::new(ops::FUSED_GEMM, inputs, vec![new_out])
                        .with_attrs(attrs)
                        .with_device(instr.device),
                );
                rewrite.substitute(old_out, new_out);
            } else if !removed.contains(&index) {
                rewrite.program.push(instr.clone());
            }
        }
        Ok(rewrite)
    }
}
