//! Drop `identity` instructions and forward their input to every reader.

use crate::graph::{ops, Program};
use crate::pass::{PassContext, ProgramPass, Rewrite};
use crate::utils::errors::CompileResult;
use log::debug;

/// Identities producing a fetch id are kept so the id stays observable.
#[derive(Debug, Default)]
pub struct RemoveIdentity;

impl RemoveIdentity {
    pub const NAME: &'static str = "remove_identity";

    pub fn new() -> Self {
        Self
    }
}

impl ProgramPass for RemoveIdentity {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, program: &Program, ctx: &PassContext<'_>) -> CompileResult<Rewrite> {
        let mut rewrite = Rewrite::new(program.with_same_arena());
        for instr in program.instructions() {
            let removable = instr.is(ops::IDENTITY)
                && instr.inputs.len() == 1
                && instr.outputs.len() == 1
                && !ctx.is_fetch(program, instr.outputs[0]);
            if removable {
                debug!(
                    "{}: forwarding `{}` to readers of `{}`",
                    Self::NAME,
                    program.name(instr.inputs[0]),
                    program.name(instr.outputs[0])
                );
                rewrite.substitute(instr.outputs[0], instr.inputs[0]);
            } else {
                rewrite.program.push(instr.clone());
            }
        }
        Ok(rewrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DataType, ProgramBuilder};
    use crate::pass::{DefUse, Target};
    use std::collections::HashSet;

    #[test]
    fn test_chain_collapses() {
        let mut b = ProgramBuilder::new();
        let x = b.input("X", vec![4], DataType::Float32).unwrap();
        let i0 = b.identity(x, "I0").unwrap();
        let i1 = b.identity(i0, "I1").unwrap();
        b.relu(i1, "Y").unwrap();
        let prog = b.build();

        let fetch: HashSet<String> = ["Y".to_string()].into_iter().collect();
        let def_use = DefUse::build(&prog);
        let target = Target::host();
        let ctx = PassContext { fetch_ids: &fetch, target: &target, def_use: &def_use };
        let out = RemoveIdentity::new().run(&prog, &ctx).unwrap().finish();
        assert_eq!(out.len(), 1);
        assert_eq!(out.name(out.instructions()[0].inputs[0]), "X");
    }

    #[test]
    fn test_fetched_identity_kept() {
        let mut b = ProgramBuilder::new();
        let x = b.input("X", vec![4], DataType::Float32).unwrap();
        b.identity(x, "Y").unwrap();
        let prog = b.build();

        let fetch: HashSet<String> = ["Y".to_string()].into_iter().collect();
        let def_use = DefUse::build(&prog);
        let target = Target::host();
        let ctx = PassContext { fetch_ids: &fetch, target: &target, def_use: &def_use };
        let out = RemoveIdentity::new().run(&prog, &ctx).unwrap().finish();
        assert_eq!(out.len(), 1);
    }
}
