//! Structural checks run after every pass.

use crate::graph::{signature, Program, VarId};
use crate::utils::errors::{InvariantError, InvariantKind};
use std::collections::{HashMap, HashSet};

/// Check topology, single assignment, reference resolution, op arity and
/// fetch survival. `pass` names the pass blamed in the error.
pub fn verify(program: &Program, fetch_ids: &HashSet<String>, pass: &str) -> Result<(), InvariantError> {
    let err = |kind: InvariantKind, message: String| InvariantError::new(kind, pass, message);

    let mut produced_at: HashMap<VarId, usize> = HashMap::new();
    let mut names: HashSet<&str> = HashSet::new();
    for &input in program.inputs() {
        if program.get_var(input).is_none() {
            return Err(err(InvariantKind::DanglingReference, format!("program input {} is not allocated", input)));
        }
        names.insert(program.name(input));
    }
    for (index, instr) in program.instructions().iter().enumerate() {
        for &out in &instr.outputs {
            if program.get_var(out).is_none() {
                return Err(err(
                    InvariantKind::DanglingReference,
                    format!("instruction {} (`{}`) writes unallocated {}", index, instr.op_type, out),
                ));
            }
            if !names.insert(program.name(out)) || produced_at.insert(out, index).is_some() {
                return Err(err(
                    InvariantKind::SsaViolation,
                    format!("`{}` is assigned more than once (instruction {})", program.name(out), index),
                ));
            }
        }
    }

    let inputs: HashSet<VarId> = program.inputs().iter().copied().collect();
    for (index, instr) in program.instructions().iter().enumerate() {
        if !instr.arity_ok() {
            let (n_in, n_out) = signature(&instr.op_type).unwrap_or_default();
            return Err(err(
                InvariantKind::ArityMismatch,
                format!(
                    "instruction {} (`{}`) has {} input(s) and {} output(s), expected {} and {}",
                    index,
                    instr.op_type,
                    instr.inputs.len(),
                    instr.outputs.len(),
                    n_in,
                    n_out
                ),
            ));
        }
        for &input in &instr.inputs {
            if inputs.contains(&input) {
                continue;
            }
            match produced_at.get(&input) {
                Some(&at) if at < index => {}
                Some(&at) => {
                    return Err(err(
                        InvariantKind::Topology,
                        format!(
                            "instruction {} (`{}`) reads `{}` before its producer at {}",
                            index,
                            instr.op_type,
                            program.name(input),
                            at
                        ),
                    ));
                }
                None => {
                    let name = program.get_var(input).map(|v| v.id.as_str()).unwrap_or("?");
                    return Err(err(
                        InvariantKind::DanglingReference,
                        format!("instruction {} (`{}`) reads {} `{}` which nothing produces", index, instr.op_type, input, name),
                    ));
                }
            }
        }
    }

    let mut missing: Vec<&str> = fetch_ids
        .iter()
        .map(String::as_str)
        .filter(|id| !program.produces(id))
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(err(
            InvariantKind::FetchRemoved,
            format!("fetch id(s) {} no longer produced", missing.join(", ")),
        ));
    }
    Ok(())
}
