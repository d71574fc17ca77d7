//! The dataflow program under transformation.

use crate::graph::instruction::Instruction;
use crate::graph::variable::{VarId, Variable};
use crate::utils::errors::{CompileResult, ConfigError, ConfigErrorKind};
use crate::utils::pretty::CodeFormatter;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// An ordered list of instructions over an arena of variables.
///
/// Instruction order is the execution order and must be topological.
/// Variables are referenced by [`VarId`] only; string ids are resolved
/// through the program.
#[derive(Debug, Clone, Default)]
pub struct Program {
    variables: Vec<Variable>,
    instructions: Vec<Instruction>,
    inputs: Vec<VarId>,
    /// Newest arena entry for each string id
    by_name: HashMap<String, VarId>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a program input.
    pub fn add_input(&mut self, var: Variable) -> CompileResult<VarId> {
        let id = self.declare(var)?;
        self.inputs.push(id);
        Ok(id)
    }

    /// Allocate a variable whose string id is not yet used.
    pub fn declare(&mut self, var: Variable) -> CompileResult<VarId> {
        if self.by_name.contains_key(&var.id) {
            return Err(ConfigError::new(
                ConfigErrorKind::DuplicateVariable,
                format!("variable `{}` is declared twice", var.id),
            )
            .into());
        }
        Ok(self.alloc(var))
    }

    fn alloc(&mut self, var: Variable) -> VarId {
        let id = VarId(self.variables.len() as u32);
        self.by_name.insert(var.id.clone(), id);
        self.variables.push(var);
        id
    }

    /// Allocate a fresh arena entry carrying the same string id, shape and
    /// type as `old`. References to `old` are left untouched.
    pub fn supersede(&mut self, old: VarId) -> VarId {
        let var = self.variables[old.index()].clone();
        self.alloc(var)
    }

    /// Append an instruction. No checks are made here; see
    /// [`crate::pass::verify`].
    pub fn push(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    /// A program with the same variables and inputs but no instructions.
    pub fn with_same_arena(&self) -> Program {
        Program {
            variables: self.variables.clone(),
            instructions: Vec::new(),
            inputs: self.inputs.clone(),
            by_name: self.by_name.clone(),
        }
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn get_var(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.index())
    }

    /// String id of a variable.
    pub fn name(&self, id: VarId) -> &str {
        &self.variables[id.index()].id
    }

    /// Newest arena entry with the given string id.
    pub fn lookup(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn inputs(&self) -> &[VarId] {
        &self.inputs
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Index of the instruction producing an output with string id `name`.
    pub fn producer_of(&self, name: &str) -> Option<usize> {
        self.instructions
            .iter()
            .position(|instr| instr.outputs.iter().any(|&o| self.name(o) == name))
    }

    /// Whether some instruction produces an output named `name`.
    pub fn produces(&self, name: &str) -> bool {
        self.producer_of(name).is_some()
    }

    /// Rewrite every instruction input through `substitutions`.
    ///
    /// Chains are followed (`a -> b`, `b -> c` rewrites `a` to `c`).
    /// Returns the number of rewritten operands.
    pub fn relink(&mut self, substitutions: &BTreeMap<VarId, VarId>) -> usize {
        if substitutions.is_empty() {
            return 0;
        }
        let limit = substitutions.len();
        let resolve = |mut v: VarId| {
            let mut steps = 0;
            while let Some(&next) = substitutions.get(&v) {
                if next == v || steps > limit {
                    break;
                }
                v = next;
                steps += 1;
            }
            v
        };
        let mut rewritten = 0;
        for instr in &mut self.instructions {
            for input in &mut instr.inputs {
                let target = resolve(*input);
                if target != *input {
                    *input = target;
                    rewritten += 1;
                }
            }
        }
        rewritten
    }

    /// Drop arena entries no instruction or input refers to and renumber
    /// the rest. Any `VarId` held outside the program is invalidated.
    pub fn compact(&mut self) {
        let mut remap: Vec<Option<VarId>> = vec![None; self.variables.len()];
        let mut variables = Vec::new();
        let mut by_name = HashMap::new();
        let referenced = self
            .inputs
            .iter()
            .chain(self.instructions.iter().flat_map(|i| i.inputs.iter().chain(i.outputs.iter())));
        for &id in referenced {
            if id.index() >= remap.len() || remap[id.index()].is_some() {
                continue;
            }
            let new_id = VarId(variables.len() as u32);
            remap[id.index()] = Some(new_id);
            let var: Variable = self.variables[id.index()].clone();
            by_name.insert(var.id.clone(), new_id);
            variables.push(var);
        }
        let apply = |id: &mut VarId| {
            if let Some(Some(new_id)) = remap.get(id.index()) {
                *id = *new_id;
            }
        };
        self.inputs.iter_mut().for_each(apply);
        for instr in &mut self.instructions {
            instr.inputs.iter_mut().for_each(apply);
            instr.outputs.iter_mut().for_each(apply);
        }
        self.variables = variables;
        self.by_name = by_name;
    }

    /// Multi-line rendering for logs. Not a stable format.
    pub fn render(&self) -> String {
        let mut fmt = CodeFormatter::default_indent();
        fmt.block("Program", |f| {
            let inputs: Vec<&str> = self.inputs.iter().map(|&v| self.name(v)).collect();
            f.writeln(&format!("inputs: {}", inputs.join(", ")));
            for instr in &self.instructions {
                let outs: Vec<&str> = instr.outputs.iter().map(|&v| self.name(v)).collect();
                let mut args: Vec<String> = instr.inputs.iter().map(|&v| self.name(v).to_string()).collect();
                args.extend(instr.attrs.iter().map(|(k, v)| format!("{}={}", k, v)));
                f.writeln(&format!("{} = {}({})", outs.join(", "), instr.op_type, args.join(", ")));
            }
        });
        fmt.finish()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::instruction::ops;
    use crate::graph::variable::DataType;

    fn var(name: &str) -> Variable {
        Variable::new(name, vec![2, 2], DataType::Float32)
    }

    #[test]
    fn test_duplicate_declaration() {
        let mut prog = Program::new();
        prog.add_input(var("A")).unwrap();
        assert!(prog.add_input(var("A")).is_err());
    }

    #[test]
    fn test_supersede_keeps_name() {
        let mut prog = Program::new();
        let a = prog.add_input(var("A")).unwrap();
        let out = prog.declare(var("Out")).unwrap();
        prog.push(Instruction::new(ops::RELU, vec![a], vec![out]));
        let fresh = prog.supersede(out);
        assert_ne!(fresh, out);
        assert_eq!(prog.name(fresh), "Out");
        assert_eq!(prog.lookup("Out"), Some(fresh));
    }

    #[test]
    fn test_relink_follows_chains() {
        let mut prog = Program::new();
        let a = prog.add_input(var("A")).unwrap();
        let b = prog.declare(var("B")).unwrap();
        let c = prog.declare(var("C")).unwrap();
        let d = prog.declare(var("D")).unwrap();
        prog.push(Instruction::new(ops::RELU, vec![c], vec![d]));
        let subs: BTreeMap<VarId, VarId> = [(c, b), (b, a)].into_iter().collect();
        assert_eq!(prog.relink(&subs), 1);
        assert_eq!(prog.instructions()[0].inputs, vec![a]);
    }

    #[test]
    fn test_compact_drops_unreferenced() {
        let mut prog = Program::new();
        let a = prog.add_input(var("A")).unwrap();
        let _unused = prog.declare(var("Unused")).unwrap();
        let out = prog.declare(var("Out")).unwrap();
        prog.push(Instruction::new(ops::RELU, vec![a], vec![out]));
        prog.compact();
        assert_eq!(prog.num_variables(), 2);
        assert!(prog.lookup("Unused").is_none());
        let out = prog.lookup("Out").unwrap();
        assert_eq!(prog.instructions()[0].outputs, vec![out]);
    }

    #[test]
    fn test_render() {
        let mut prog = Program::new();
        let a = prog.add_input(var("A")).unwrap();
        let out = prog.declare(var("Out")).unwrap();
        prog.push(Instruction::new(ops::RELU, vec![a], vec![out]));
        let text = prog.to_string();
        assert!(text.contains("inputs: A"));
        assert!(text.contains("Out = relu(A)"));
    }
}
