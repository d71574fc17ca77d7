//! Serializable program description.
//!
//! This is the exchange format between the operator-mapping layer and the
//! pass pipeline: variables are named by string id, and an instruction's
//! outputs are declared where they are produced.

use crate::graph::attr::Attrs;
use crate::graph::instruction::{Device, Instruction};
use crate::graph::program::Program;
use crate::graph::variable::Variable;
use crate::utils::errors::{CompileResult, ConfigError, ConfigErrorKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionDesc {
    pub op: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<Variable>,
    #[serde(default, skip_serializing_if = "Attrs::is_empty")]
    pub attrs: Attrs,
    #[serde(default)]
    pub device: Device,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramDesc {
    pub inputs: Vec<Variable>,
    pub instructions: Vec<InstructionDesc>,
}

impl ProgramDesc {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Resolve names and build the arena program.
    ///
    /// Inputs must name a program input or an earlier output; every id
    /// must be declared exactly once.
    pub fn into_program(self) -> CompileResult<Program> {
        let mut program = Program::new();
        for var in self.inputs {
            program.add_input(var)?;
        }
        for desc in self.instructions {
            let mut inputs = Vec::with_capacity(desc.inputs.len());
            for name in &desc.inputs {
                let id = program.lookup(name).ok_or_else(|| {
                    ConfigError::new(
                        ConfigErrorKind::UnknownVariable,
                        format!("`{}` reads undeclared variable `{}`", desc.op, name),
                    )
                })?;
                inputs.push(id);
            }
            let mut outputs = Vec::with_capacity(desc.outputs.len());
            for var in desc.outputs {
                outputs.push(program.declare(var)?);
            }
            program.push(
                Instruction::new(desc.op, inputs, outputs)
                    .with_attrs(desc.attrs)
                    .with_device(desc.device),
            );
        }
        Ok(program)
    }

    pub fn from_program(program: &Program) -> Self {
        let inputs = program.inputs().iter().map(|&v| program.var(v).clone()).collect();
        let instructions = program
            .instructions()
            .iter()
            .map(|instr| InstructionDesc {
                op: instr.op_type.clone(),
                inputs: instr.inputs.iter().map(|&v| program.name(v).to_string()).collect(),
                outputs: instr.outputs.iter().map(|&v| program.var(v).clone()).collect(),
                attrs: instr.attrs.clone(),
                device: instr.device,
            })
            .collect();
        Self { inputs, instructions }
    }
}
