//! Lowering of stage domains and schedules into one loop-nest AST.

use crate::bridge::{Expr, ExprBridge};
use crate::codegen::ast::{AstExpr, AstNode};
use crate::codegen::options::BuildOptions;
use crate::codegen::scanner::{ScanStage, Scanner};
use crate::polyhedral::degenerate::{correct_degenerate_axes, ConstBinding};
use crate::polyhedral::domain::IterationDomain;
use crate::polyhedral::schedule::{Placement, Schedule, ScheduleGroup};
use crate::polyhedral::set::IntegerSet;
use crate::utils::errors::{CompileError, CompileResult, ConfigError, ConfigErrorKind};
use log::{debug, info};
use std::collections::{BTreeMap, HashSet};

/// Builds the AST of a group of stages.
///
/// Lifecycle: construct, optionally set iterator names and build
/// options, then [`build`](Self::build). The accessors are valid once
/// built; setters are rejected afterwards.
#[derive(Debug)]
pub struct AstBuilder {
    context: IntegerSet,
    /// Every parameter, `_const_*` ones included.
    params: Vec<String>,
    domains: Vec<IterationDomain>,
    schedules: Vec<Schedule>,
    placements: Vec<Vec<Placement>>,
    const_bindings: Vec<ConstBinding>,
    n_levels: usize,
    iterator_names: Vec<String>,
    options: BuildOptions,
    ast: Option<AstNode>,
}

fn config_err(kind: ConfigErrorKind, message: String) -> CompileError {
    ConfigError::new(kind, message).into()
}

impl AstBuilder {
    /// Validate the stages, align all parameters by name and correct
    /// single-valued axes.
    pub fn new(context: IntegerSet, domains: Vec<IterationDomain>, group: ScheduleGroup) -> CompileResult<Self> {
        if context.dim() != 0 {
            return Err(config_err(
                ConfigErrorKind::DimensionMismatch,
                format!("context must be parameter-only, found {} dimensions", context.dim()),
            ));
        }

        let mut seen = HashSet::new();
        for d in &domains {
            if !seen.insert(d.name.as_str()) {
                return Err(config_err(ConfigErrorKind::DuplicateStage, format!("duplicate stage `{}`", d.name)));
            }
        }
        let mut seen = HashSet::new();
        for s in group.iter() {
            if !seen.insert(s.stage.as_str()) {
                return Err(config_err(
                    ConfigErrorKind::DuplicateStage,
                    format!("stage `{}` has more than one schedule", s.stage),
                ));
            }
            if !domains.iter().any(|d| d.name == s.stage) {
                return Err(config_err(
                    ConfigErrorKind::MissingSchedule,
                    format!("schedule for `{}` has no iteration domain", s.stage),
                ));
            }
        }

        let mut schedules = Vec::with_capacity(domains.len());
        for d in &domains {
            let s = group.get(&d.name).ok_or_else(|| {
                config_err(ConfigErrorKind::MissingSchedule, format!("stage `{}` has no schedule", d.name))
            })?;
            if s.n_in() != d.n_dim() {
                return Err(config_err(
                    ConfigErrorKind::DimensionMismatch,
                    format!("stage `{}`: domain has {} dimensions, schedule has {} inputs", d.name, d.n_dim(), s.n_in()),
                ));
            }
            schedules.push(s.clone());
        }

        let mut params = context.param_names();
        let all = domains.iter().flat_map(|d| d.param_names()).chain(schedules.iter().flat_map(|s| s.map.param_names()));
        for p in all {
            if !params.contains(&p) {
                params.push(p);
            }
        }
        let mut context = align(context.align_params(&params), "context")?;
        let mut domains = domains
            .into_iter()
            .map(|d| {
                let set = align(d.set.align_params(&params), &d.name)?;
                Ok(IterationDomain::new(d.name, set))
            })
            .collect::<CompileResult<Vec<_>>>()?;

        let const_bindings = correct_degenerate_axes(&mut context, &mut domains);
        let params = context.param_names();

        let n_levels = schedules.iter().map(Schedule::n_out).max().unwrap_or(0);
        let mut placements = Vec::with_capacity(schedules.len());
        for s in schedules.iter_mut() {
            let map = align(s.map.align_params(&params), &s.stage)?;
            s.map = map;
            s.pad_to(n_levels);
            placements.push(s.placements()?);
        }

        debug!(
            "ast builder: {} stages, {} timestamp levels, parameters [{}]",
            domains.len(),
            n_levels,
            params.join(", ")
        );
        Ok(Self {
            context,
            params,
            domains,
            schedules,
            placements,
            const_bindings,
            n_levels,
            iterator_names: Vec::new(),
            options: BuildOptions::new(),
            ast: None,
        })
    }

    fn ensure_not_built(&self, what: &str) -> CompileResult<()> {
        if self.ast.is_some() {
            return Err(config_err(ConfigErrorKind::AlreadyBuilt, format!("{} called after build()", what)));
        }
        Ok(())
    }

    fn built(&self) -> CompileResult<&AstNode> {
        self.ast
            .as_ref()
            .ok_or_else(|| config_err(ConfigErrorKind::NotBuilt, "AST has not been built yet".to_string()))
    }

    /// Names for the loop iterators, outermost first.
    pub fn set_iterator_names<S: AsRef<str>>(&mut self, names: &[S]) -> CompileResult<()> {
        self.ensure_not_built("set_iterator_names")?;
        self.iterator_names = names.iter().map(|s| s.as_ref().to_string()).collect();
        Ok(())
    }

    pub fn set_build_options(&mut self, options: BuildOptions) -> CompileResult<()> {
        self.ensure_not_built("set_build_options")?;
        self.options = options;
        Ok(())
    }

    /// One iterator name per timestamp level: the given name or `c{L}`,
    /// with a `_{n}` suffix where it would repeat an earlier name or a
    /// parameter.
    pub fn iterators(&self) -> Vec<String> {
        let mut taken: HashSet<String> = self.params.iter().cloned().collect();
        let mut names = Vec::with_capacity(self.n_levels);
        for level in 0..self.n_levels {
            let base = self.iterator_names.get(level).cloned().unwrap_or_else(|| format!("c{}", level));
            let mut name = base.clone();
            let mut n = 1;
            while taken.contains(&name) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            taken.insert(name.clone());
            names.push(name);
        }
        names
    }

    /// Lower every stage. Building twice returns the first AST.
    pub fn build(&mut self) -> CompileResult<&AstNode> {
        if self.ast.is_none() {
            let iterators = self.iterators();
            let stages = self
                .domains
                .iter()
                .zip(&self.placements)
                .map(|(d, p)| ScanStage {
                    name: d.name.clone(),
                    axis_names: d.axis_names(),
                    domain: d.set.clone(),
                    placements: p.clone(),
                })
                .collect();
            let scanner = Scanner::new(&self.context, &self.params, &iterators, &self.options, stages)?;
            let ast = scanner.scan()?;
            info!(
                "built AST: {} of {} stages live, {} loops",
                scanner.live_stages().len(),
                self.domains.len(),
                ast.loop_count()
            );
            self.ast = Some(ast);
        }
        self.built()
    }

    pub fn ast(&self) -> CompileResult<&AstNode> {
        self.built()
    }

    fn domain(&self, stage: &str) -> CompileResult<&IterationDomain> {
        self.domains
            .iter()
            .find(|d| d.name == stage)
            .ok_or_else(|| config_err(ConfigErrorKind::UnknownStage, format!("unknown stage `{}`", stage)))
    }

    /// Whether `stage` still appears in the built AST.
    pub fn contains_statement(&self, stage: &str) -> CompileResult<bool> {
        Ok(self.built()?.contains_stmt(stage))
    }

    /// Original axis name to the AST expression that computes it, taken
    /// from the first leaf of `stage`. Empty when the stage was dropped.
    pub fn axis2ast(&self, stage: &str) -> CompileResult<BTreeMap<String, AstExpr>> {
        let ast = self.built()?;
        let domain = self.domain(stage)?;
        let Some(args) = ast.find_stmt(stage) else {
            return Ok(BTreeMap::new());
        };
        Ok(domain.axis_names().into_iter().zip(args.iter().cloned()).collect())
    }

    /// Like [`axis2ast`](Self::axis2ast), converted to [`Expr`] with the
    /// `_const_*` parameters replaced by their values.
    pub fn axis2expr(&self, stage: &str) -> CompileResult<BTreeMap<String, Expr>> {
        let bridge = ExprBridge::with_constants(self.const_param_bindings());
        Ok(self
            .axis2ast(stage)?
            .into_iter()
            .map(|(axis, e)| (axis, bridge.convert_expr(&e)))
            .collect())
    }

    /// User-visible parameters, without the ones introduced for fixed axes.
    pub fn params(&self) -> Vec<String> {
        let introduced: HashSet<&str> = self.const_bindings.iter().map(|b| b.param.as_str()).collect();
        self.params.iter().filter(|p| !introduced.contains(p.as_str())).cloned().collect()
    }

    /// Values of the `_const_*` parameters.
    pub fn const_param_bindings(&self) -> BTreeMap<String, i64> {
        self.const_bindings.iter().map(|b| (b.param.clone(), b.value)).collect()
    }

    pub fn const_bindings(&self) -> &[ConstBinding] {
        &self.const_bindings
    }

    pub fn n_levels(&self) -> usize {
        self.n_levels
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.domains.iter().map(|d| d.name.as_str()).collect()
    }

    /// Corrected domain of `stage`.
    pub fn stage_domain(&self, stage: &str) -> CompileResult<&IterationDomain> {
        self.domain(stage)
    }

    /// Aligned and padded schedule of `stage`.
    pub fn stage_schedule(&self, stage: &str) -> CompileResult<&Schedule> {
        self.domain(stage)?;
        self.schedules
            .iter()
            .find(|s| s.stage == stage)
            .ok_or_else(|| config_err(ConfigErrorKind::UnknownStage, format!("unknown stage `{}`", stage)))
    }
}

fn align<T>(aligned: Option<T>, what: &str) -> CompileResult<T> {
    aligned.ok_or_else(|| {
        config_err(ConfigErrorKind::DimensionMismatch, format!("`{}`: parameters could not be aligned", what))
    })
}
