//! Program passes.
//!
//! A pass never mutates the program it is given. It returns a [`Rewrite`]:
//! the rebuilt program plus an explicit old-to-new variable substitution
//! table. The [`PassManager`] relinks the substitutions, verifies the
//! result and only then commits it.

pub mod analysis;
pub mod dead_code;
pub mod gemm_rewriter;
pub mod manager;
pub mod registry;
pub mod remove_identity;
pub mod verify;

pub use analysis::DefUse;
pub use dead_code::DeadCodeElimination;
pub use gemm_rewriter::GemmRewriter;
pub use manager::PassManager;
pub use registry::{PassEntry, PassFactory, PassRegistry, BUILTIN_PASSES};
pub use remove_identity::RemoveIdentity;
pub use verify::verify;

use crate::graph::{Program, VarId};
use crate::utils::errors::CompileResult;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Hardware architecture passes are specialised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    #[default]
    Host,
    NvGpu,
}

/// Compilation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Target {
    pub arch: Arch,
}

impl Target {
    pub fn host() -> Self {
        Self { arch: Arch::Host }
    }

    pub fn nvgpu() -> Self {
        Self { arch: Arch::NvGpu }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arch {
            Arch::Host => write!(f, "host"),
            Arch::NvGpu => write!(f, "nvgpu"),
        }
    }
}

/// Read-only inputs handed to a pass.
pub struct PassContext<'a> {
    /// Variable ids that must stay observable
    pub fetch_ids: &'a HashSet<String>,
    pub target: &'a Target,
    /// Producer and use tables of the program being rewritten
    pub def_use: &'a DefUse,
}

impl PassContext<'_> {
    pub fn is_fetch(&self, program: &Program, var: VarId) -> bool {
        self.fetch_ids.contains(program.name(var))
    }
}

/// Result of running one pass.
#[derive(Debug, Clone)]
pub struct Rewrite {
    pub program: Program,
    /// Old variable -> replacement, applied to every instruction input
    pub substitutions: BTreeMap<VarId, VarId>,
}

impl Rewrite {
    /// A rewrite that changes nothing.
    pub fn unchanged(program: &Program) -> Self {
        Self { program: program.clone(), substitutions: BTreeMap::new() }
    }

    pub fn new(program: Program) -> Self {
        Self { program, substitutions: BTreeMap::new() }
    }

    /// Record that readers of `old` must read `new` instead.
    pub fn substitute(&mut self, old: VarId, new: VarId) {
        self.substitutions.insert(old, new);
    }

    /// Apply the substitution table to the rebuilt program.
    pub fn finish(mut self) -> Program {
        let relinked = self.program.relink(&self.substitutions);
        log::trace!("relinked {} operand(s) through {} substitution(s)", relinked, self.substitutions.len());
        self.program
    }
}

/// A named program transformation.
pub trait ProgramPass: Send + Sync {
    /// Registry name.
    fn name(&self) -> &str;

    /// Whether the pass does anything for `target`. Inapplicable passes are
    /// skipped, not reported.
    fn applies_to(&self, _target: &Target) -> bool {
        true
    }

    /// Rebuild `program`. Pattern mismatches are not errors.
    fn run(&self, program: &Program, ctx: &PassContext<'_>) -> CompileResult<Rewrite>;
}

/// Apply `pass_names` in order through `registry`.
///
/// Shorthand for [`PassManager::apply`].
pub fn apply<S: AsRef<str>>(
    registry: &PassRegistry,
    program: &mut Program,
    fetch_ids: &HashSet<String>,
    target: &Target,
    pass_names: &[S],
) -> CompileResult<()> {
    PassManager::new(registry).apply(program, fetch_ids, target, pass_names)
}
