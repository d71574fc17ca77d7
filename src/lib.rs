//! # tensorpoly - Graph Passes and Polyhedral Lowering for Tensor Programs
//!
//! The middle tier of a tensor compiler:
//! - A graph model of instructions over named variables
//! - A pass registry and manager that rewrites programs under verification
//! - Pattern fusion (`matmul` + `elementwise_add` into `gemm`)
//! - A polyhedral model of stage iteration domains and schedules
//! - An AST builder that scans those domains into loop nests
//! - A bridge from the loop-nest AST to the compiler's expression tree
//!
//! ## Architecture
//!
//! ```text
//! Program → Passes → (operator mapping) → Domains + Schedules → AST → Expr
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use tensorpoly::prelude::*;
//!
//! let request = LoweringRequest {
//!     context: "[N] -> { : N >= 1 }".into(),
//!     stages: vec![StageDesc::new("[N] -> { S[i] : 0 <= i < N }")],
//!     ..Default::default()
//! };
//! let lowered = tensorpoly::lower(&request)?;
//! println!("{}", lowered.ast);
//! ```

#![warn(clippy::all)]

pub mod bridge;
pub mod codegen;
pub mod graph;
pub mod pass;
pub mod polyhedral;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::bridge::{Expr, ExprBridge, LoopRange};
    pub use crate::codegen::{AstBuilder, AstExpr, AstNode, BuildOptions, LoopKind};
    pub use crate::graph::{DataType, Instruction, Program, ProgramBuilder, ProgramDesc, VarId, Variable};
    pub use crate::pass::{apply, PassManager, PassRegistry, ProgramPass, Rewrite, Target};
    pub use crate::polyhedral::{AffineMap, IntegerSet, IterationDomain, Schedule, ScheduleGroup};
    pub use crate::utils::errors::*;
    pub use crate::{CompilerConfig, Lowered, LoweringRequest, StageDesc};
}

use anyhow::{Context, Result};
use bridge::{Expr, ExprBridge};
use codegen::{AstBuilder, AstNode, BuildOptions};
use graph::Program;
use pass::{PassRegistry, Target};
use polyhedral::parse::parse_context;
use polyhedral::{IterationDomain, Schedule, ScheduleGroup};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Configuration for the pass pipeline and the AST builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Target the passes are specialised for
    pub target: Target,
    /// Pass names, applied in order
    pub passes: Vec<String>,
    /// Variable ids that must survive every pass
    pub fetch_ids: Vec<String>,
    /// Loop iterator names, outermost first
    pub iterator_names: Vec<String>,
    /// Per-level loop options, e.g. `{ separate[0]; unroll[1] }`
    pub build_options: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            target: Target::host(),
            passes: vec!["remove_identity".to_string(), "gemm_rewriter".to_string()],
            fetch_ids: Vec::new(),
            iterator_names: Vec::new(),
            build_options: String::new(),
        }
    }
}

impl CompilerConfig {
    pub fn fetch_set(&self) -> HashSet<String> {
        self.fetch_ids.iter().cloned().collect()
    }

    pub fn parsed_build_options(&self) -> Result<BuildOptions> {
        if self.build_options.trim().is_empty() {
            return Ok(BuildOptions::new());
        }
        BuildOptions::parse(&self.build_options)
            .with_context(|| format!("Invalid build options: {}", self.build_options))
    }
}

/// Run the configured passes over `program` with the builtin registry.
pub fn optimize(mut program: Program, config: &CompilerConfig) -> Result<Program> {
    let registry = PassRegistry::with_builtin_passes();
    pass::apply(&registry, &mut program, &config.fetch_set(), &config.target, &config.passes)
        .with_context(|| format!("Pass pipeline [{}] failed", config.passes.join(", ")))?;
    Ok(program)
}

/// One stage to lower: its domain and, optionally, its schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDesc {
    /// `[N] -> { S[i] : 0 <= i < N }`
    pub domain: String,
    /// `[N] -> { S[i] -> [0, i] }`; the identity schedule when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

impl StageDesc {
    pub fn new(domain: impl Into<String>) -> Self {
        Self { domain: domain.into(), schedule: None }
    }

    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }
}

/// Text description of a group of stages to lower together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoweringRequest {
    /// Parameter-only context, e.g. `[N] -> { : N >= 1 }`
    pub context: String,
    pub stages: Vec<StageDesc>,
    pub iterator_names: Vec<String>,
    pub build_options: String,
}

impl Default for LoweringRequest {
    fn default() -> Self {
        Self { context: "{ : }".to_string(), stages: Vec::new(), iterator_names: Vec::new(), build_options: String::new() }
    }
}

impl LoweringRequest {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Parse the request into a configured, unbuilt [`AstBuilder`].
    pub fn builder(&self) -> Result<AstBuilder> {
        let context = parse_context(&self.context).with_context(|| format!("Invalid context: {}", self.context))?;
        let mut domains = Vec::with_capacity(self.stages.len());
        let mut group = ScheduleGroup::new();
        for stage in &self.stages {
            let domain = IterationDomain::parse(&stage.domain)
                .with_context(|| format!("Invalid domain: {}", stage.domain))?;
            let schedule = match &stage.schedule {
                Some(text) => Schedule::parse(text).with_context(|| format!("Invalid schedule: {}", text))?,
                None => Schedule::identity(&domain),
            };
            group.push(schedule);
            domains.push(domain);
        }

        let mut builder = AstBuilder::new(context, domains, group)?;
        builder.set_iterator_names(&self.iterator_names)?;
        if !self.build_options.trim().is_empty() {
            let options = BuildOptions::parse(&self.build_options)
                .with_context(|| format!("Invalid build options: {}", self.build_options))?;
            builder.set_build_options(options)?;
        }
        Ok(builder)
    }
}

/// Result of [`lower`].
#[derive(Debug, Clone)]
pub struct Lowered {
    pub ast: AstNode,
    /// The AST converted to the expression tree, constants substituted
    pub expr: Expr,
    /// Per stage: original axis name to the expression computing it
    pub axis_exprs: BTreeMap<String, BTreeMap<String, Expr>>,
    /// Values of the internal `_const_*` parameters
    pub const_params: BTreeMap<String, i64>,
}

/// Build the AST of a group of stages and bridge it to [`Expr`].
pub fn lower(request: &LoweringRequest) -> Result<Lowered> {
    let mut builder = request.builder()?;
    let ast = builder.build().context("AST construction failed")?.clone();
    let const_params = builder.const_param_bindings();
    let expr = ExprBridge::with_constants(const_params.clone()).convert_node(&ast);

    let mut axis_exprs = BTreeMap::new();
    for stage in builder.stage_names() {
        axis_exprs.insert(stage.to_string(), builder.axis2expr(stage)?);
    }
    Ok(Lowered { ast, expr, axis_exprs, const_params })
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
