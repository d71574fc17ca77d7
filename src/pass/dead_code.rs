//! Remove instructions whose results are never observed.

use crate::graph::{Program, VarId};
use crate::pass::{PassContext, ProgramPass, Rewrite};
use crate::utils::errors::CompileResult;
use log::debug;
use std::collections::HashSet;

/// An instruction is live if one of its outputs is fetched or read by a
/// live instruction. With no fetch ids every instruction is dead.
#[derive(Debug, Default)]
pub struct DeadCodeElimination;

impl DeadCodeElimination {
    pub const NAME: &'static str = "dead_code_elimination";

    pub fn new() -> Self {
        Self
    }
}

impl ProgramPass for DeadCodeElimination {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, program: &Program, ctx: &PassContext<'_>) -> CompileResult<Rewrite> {
        let mut needed: HashSet<VarId> = HashSet::new();
        let mut live = vec![false; program.len()];
        for (index, instr) in program.instructions().iter().enumerate().rev() {
            let observed = instr
                .outputs
                .iter()
                .any(|&out| needed.contains(&out) || ctx.is_fetch(program, out));
            if observed {
                live[index] = true;
                needed.extend(instr.inputs.iter().copied());
            }
        }

        let mut rewrite = Rewrite::new(program.with_same_arena());
        for (instr, keep) in program.instructions().iter().zip(&live) {
            if *keep {
                rewrite.program.push(instr.clone());
            } else {
                debug!("{}: dropping dead `{}`", Self::NAME, instr.op_type);
            }
        }
        Ok(rewrite)
    }
}
