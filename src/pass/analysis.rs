//! Def-use tables derived from a program.

use crate::graph::{Program, VarId};
use std::collections::HashMap;

/// Producer and use-count lookup, rebuilt for every pass invocation.
#[derive(Debug, Clone, Default)]
pub struct DefUse {
    producer: HashMap<VarId, usize>,
    uses: HashMap<VarId, usize>,
}

impl DefUse {
    /// One forward scan over the instructions.
    ///
    /// Uses are counted per input slot, so an instruction reading the same
    /// variable twice contributes two uses.
    pub fn build(program: &Program) -> Self {
        let mut producer = HashMap::new();
        let mut uses = HashMap::new();
        for (idx, instr) in program.instructions().iter().enumerate() {
            for &out in &instr.outputs {
                producer.insert(out, idx);
            }
            for &input in &instr.inputs {
                *uses.entry(input).or_insert(0) += 1;
            }
        }
        Self { producer, uses }
    }

    /// Index of the instruction producing `var`.
    pub fn producer_of(&self, var: VarId) -> Option<usize> {
        self.producer.get(&var).copied()
    }

    pub fn use_count(&self, var: VarId) -> usize {
        self.uses.get(&var).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DataType, ProgramBuilder};

    #[test]
    fn test_counts_per_slot() {
        let mut b = ProgramBuilder::new();
        let x = b.input("X", vec![4], DataType::Float32).unwrap();
        let r = b.relu(x, "R").unwrap();
        b.add(r, r, "S").unwrap();
        let prog = b.build();
        let du = DefUse::build(&prog);
        assert_eq!(du.producer_of(r), Some(0));
        assert_eq!(du.producer_of(x), None);
        assert_eq!(du.use_count(r), 2);
        assert_eq!(du.use_count(x), 1);
    }
}
