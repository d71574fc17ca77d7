//! Scanning of timestamp spaces into loop nests.
//!
//! Every stage's domain is rewritten over its timestamp levels
//! `t_0 .. t_{T-1}` (each axis is replaced through its first placement,
//! every other level becomes an equality). Projecting away the inner
//! levels gives, at each level `L`, constraints over `t_0 .. t_L` and the
//! parameters, from which the bounds of `t_L` are read off.
//!
//! At each level the active stages are handled as follows:
//! - all fixed to integer constants: emitted in sequence, ordered by value;
//! - all fixed to one expression: the value is bound without a loop;
//! - otherwise one loop over the union of the stages' bounds, with guards
//!   on the stages whose own bounds are narrower.

use crate::codegen::ast::{AstExpr, AstNode, LoopOrigin};
use crate::codegen::options::{BuildOptions, LoopKind};
use crate::polyhedral::constraint::{Constraint, ConstraintKind, ConstraintSystem};
use crate::polyhedral::expr::{AffineExpr, Column};
use crate::polyhedral::operations;
use crate::polyhedral::schedule::Placement;
use crate::polyhedral::set::IntegerSet;
use crate::utils::errors::{CompileResult, ConfigError, ConfigErrorKind};
use log::{debug, trace};
use std::collections::BTreeSet;

/// One stage as handed to the scanner; parameters already aligned.
#[derive(Debug, Clone)]
pub struct ScanStage {
    pub name: String,
    pub axis_names: Vec<String>,
    pub domain: IntegerSet,
    /// One entry per timestamp level.
    pub placements: Vec<Placement>,
}

/// A stage rewritten over timestamp levels.
#[derive(Debug)]
struct StageSpace {
    name: String,
    axis_names: Vec<String>,
    placements: Vec<Placement>,
    /// Each axis as an expression over the timestamp levels.
    axis_exprs: Vec<AffineExpr>,
    /// `projections[L]` constrains `t_0 ..= t_L`.
    projections: Vec<ConstraintSystem>,
    /// Parameter-only constraints the context does not already imply.
    param_guards: Vec<Constraint>,
}

/// A stage being scanned, with the guards collected so far.
#[derive(Debug, Clone)]
struct Active {
    stage: usize,
    guards: Vec<AstExpr>,
}

impl Active {
    fn guard(&mut self, cond: AstExpr) -> bool {
        match cond.as_int() {
            Some(0) => return false,
            Some(_) => {}
            None if self.guards.contains(&cond) => {}
            None => self.guards.push(cond),
        }
        true
    }
}

/// Bounds of one stage at one level.
#[derive(Debug)]
struct LevelBounds {
    active: Active,
    lowers: Vec<AstExpr>,
    uppers: Vec<AstExpr>,
    fixed: Option<AstExpr>,
}

impl LevelBounds {
    fn lower(&self) -> AstExpr {
        fold(&self.lowers, AstExpr::max)
    }

    fn upper(&self) -> Option<AstExpr> {
        if self.uppers.is_empty() { None } else { Some(fold(&self.uppers, AstExpr::min)) }
    }

    /// `active` restricted to `value`, or `None` when that is statically
    /// outside the bounds.
    fn restrict(&self, value: &AstExpr) -> Option<Active> {
        let mut active = self.active.clone();
        for l in self.lowers.iter().filter(|l| *l != value) {
            if !active.guard(value.clone().ge(l.clone()).simplify()) {
                return None;
            }
        }
        for u in self.uppers.iter().filter(|u| *u != value) {
            if !active.guard(value.clone().le(u.clone()).simplify()) {
                return None;
            }
        }
        Some(active)
    }
}

fn fold(exprs: &[AstExpr], f: fn(AstExpr, AstExpr) -> AstExpr) -> AstExpr {
    exprs
        .iter()
        .cloned()
        .reduce(f)
        .map(|e| e.simplify())
        .unwrap_or(AstExpr::Int(0))
}

fn push_unique(list: &mut Vec<AstExpr>, e: AstExpr) {
    if !list.contains(&e) {
        list.push(e);
    }
}

/// Drop all but the tightest constant bound.
fn keep_tightest_constant(list: &mut Vec<AstExpr>, pick_max: bool) {
    let best = list
        .iter()
        .filter_map(AstExpr::as_int)
        .reduce(|a, b| if pick_max { a.max(b) } else { a.min(b) });
    if let Some(best) = best {
        list.retain(|e| e.as_int().map_or(true, |v| v == best));
    }
}

pub struct Scanner<'a> {
    params: &'a [String],
    iterators: &'a [String],
    options: &'a BuildOptions,
    n_levels: usize,
    stages: Vec<StageSpace>,
}

impl<'a> Scanner<'a> {
    /// Prepare the stages for scanning. Stages empty under `context` are
    /// left out.
    pub fn new(
        context: &IntegerSet,
        params: &'a [String],
        iterators: &'a [String],
        options: &'a BuildOptions,
        stages: Vec<ScanStage>,
    ) -> CompileResult<Self> {
        let n_levels = iterators.len();
        let mut live = Vec::with_capacity(stages.len());
        for stage in stages {
            live.extend(StageSpace::new(stage, context, n_levels, params.len())?);
        }
        Ok(Self { params, iterators, options, n_levels, stages: live })
    }

    /// Names of the stages that survived the emptiness check, in order.
    pub fn live_stages(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn scan(&self) -> CompileResult<AstNode> {
        let mut active = Vec::with_capacity(self.stages.len());
        for (i, stage) in self.stages.iter().enumerate() {
            let mut a = Active { stage: i, guards: Vec::new() };
            for c in &stage.param_guards {
                a.guard(self.condition(c, &[]));
            }
            active.push(a);
        }
        let mut values = Vec::with_capacity(self.n_levels);
        let statements = self.scan_level(0, active, &mut values)?;
        Ok(AstNode::block(statements))
    }

    fn scan_level(&self, level: usize, active: Vec<Active>, values: &mut Vec<AstExpr>) -> CompileResult<Vec<AstNode>> {
        if active.is_empty() {
            return Ok(Vec::new());
        }
        if level == self.n_levels {
            return Ok(active.into_iter().map(|a| self.leaf(a, values)).collect());
        }

        let mut infos = Vec::with_capacity(active.len());
        for a in active {
            let (lowers, uppers) = self.bounds(a.stage, level, values);
            if lowers.is_empty() {
                return Err(ConfigError::new(
                    ConfigErrorKind::UnboundedLoop,
                    format!(
                        "stage `{}` has no lower bound at level {} (`{}`)",
                        self.stages[a.stage].name, level, self.iterators[level]
                    ),
                )
                .into());
            }
            let fixed = lowers.iter().find(|l| uppers.contains(l)).cloned();
            infos.push(LevelBounds { active: a, lowers, uppers, fixed });
        }

        let fixed: Option<Vec<AstExpr>> = infos.iter().map(|i| i.fixed.clone()).collect();
        if let Some(fixed) = fixed {
            if fixed.iter().all(|v| v.as_int().is_some()) {
                return self.sequence(level, &infos, values);
            }
            if fixed.iter().all(|v| *v == fixed[0]) {
                trace!("level {}: bound to `{}` without a loop", level, fixed[0]);
                let group = infos.iter().filter_map(|i| i.restrict(&fixed[0])).collect();
                values.push(fixed[0].clone());
                let nodes = self.scan_level(level + 1, group, values);
                values.pop();
                return nodes;
            }
        }

        match self.options.kind(level) {
            LoopKind::Unroll => {
                if let Some(nodes) = self.unroll(level, &infos, values)? {
                    return Ok(nodes);
                }
                debug!("level {}: extent is not a small constant, not unrolled", level);
            }
            LoopKind::Separate => {
                if let Some(nodes) = self.separate(level, &infos, values)? {
                    return Ok(nodes);
                }
                debug!("level {}: bounds are not constant, emitting one loop", level);
            }
            LoopKind::Atomic => {}
        }
        self.union_loop(level, &infos, values)
    }

    /// Stages fixed to constants, in increasing order of their value.
    fn sequence(&self, level: usize, infos: &[LevelBounds], values: &mut Vec<AstExpr>) -> CompileResult<Vec<AstNode>> {
        let mut order: Vec<(i64, usize)> = infos
            .iter()
            .enumerate()
            .filter_map(|(i, info)| info.fixed.as_ref().and_then(AstExpr::as_int).map(|v| (v, i)))
            .collect();
        order.sort_by_key(|&(v, _)| v);

        let mut nodes = Vec::new();
        let mut start = 0;
        while start < order.len() {
            let value = order[start].0;
            let end = start + order[start..].iter().take_while(|(v, _)| *v == value).count();
            let value_expr = AstExpr::Int(value);
            let group = order[start..end]
                .iter()
                .filter_map(|&(_, i)| infos[i].restrict(&value_expr))
                .collect();
            values.push(value_expr);
            nodes.extend(self.scan_level(level + 1, group, values)?);
            values.pop();
            start = end;
        }
        Ok(nodes)
    }

    fn unroll(&self, level: usize, infos: &[LevelBounds], values: &mut Vec<AstExpr>) -> CompileResult<Option<Vec<AstNode>>> {
        let (lower, upper) = union_bounds(infos);
        let (Some(lo), Some(hi)) = (lower.as_int(), upper.as_ref().and_then(AstExpr::as_int)) else {
            return Ok(None);
        };
        match hi.checked_sub(lo) {
            Some(span) if span < BuildOptions::MAX_UNROLL => {}
            _ => return Ok(None),
        }
        let mut nodes = Vec::new();
        for v in lo..=hi {
            let value = AstExpr::Int(v);
            let group = infos.iter().filter_map(|i| i.restrict(&value)).collect();
            values.push(value);
            nodes.extend(self.scan_level(level + 1, group, values)?);
            values.pop();
        }
        Ok(Some(nodes))
    }

    /// Consecutive loops, one per range covered by a fixed set of stages.
    /// Only possible when every bound is a constant.
    fn separate(&self, level: usize, infos: &[LevelBounds], values: &mut Vec<AstExpr>) -> CompileResult<Option<Vec<AstNode>>> {
        let mut ranges = Vec::with_capacity(infos.len());
        for info in infos {
            match (info.lower().as_int(), info.upper().as_ref().and_then(AstExpr::as_int)) {
                (Some(lo), Some(hi)) => ranges.push((lo, hi)),
                _ => return Ok(None),
            }
        }
        let mut breaks = BTreeSet::new();
        for &(lo, hi) in ranges.iter().filter(|(lo, hi)| lo <= hi) {
            // Ranges are half-open at the break points.
            let Some(end) = hi.checked_add(1) else { return Ok(None) };
            breaks.extend([lo, end]);
        }
        let breaks: Vec<i64> = breaks.into_iter().collect();

        let iterator = &self.iterators[level];
        let mut nodes = Vec::new();
        for w in breaks.windows(2) {
            let (lo, hi) = (w[0], w[1] - 1);
            let members: Vec<usize> = (0..infos.len())
                .filter(|&i| ranges[i].0 <= lo && ranges[i].1 >= hi)
                .collect();
            if members.is_empty() {
                continue;
            }
            let group = members.iter().map(|&i| infos[i].active.clone()).collect();
            values.push(AstExpr::Var(iterator.clone()));
            let body = self.scan_level(level + 1, group, values)?;
            values.pop();
            if body.is_empty() {
                continue;
            }
            let origin = self.origin(level, members.iter().map(|&i| &infos[i]));
            nodes.push(AstNode::For {
                iterator: iterator.clone(),
                lower: AstExpr::Int(lo),
                upper: Some(AstExpr::Int(hi)),
                stride: 1,
                body,
                origin,
            });
        }
        Ok(Some(nodes))
    }

    fn union_loop(&self, level: usize, infos: &[LevelBounds], values: &mut Vec<AstExpr>) -> CompileResult<Vec<AstNode>> {
        let iterator = &self.iterators[level];
        let iter = AstExpr::Var(iterator.clone());
        let (lower, upper) = union_bounds(infos);

        let mut group = Vec::with_capacity(infos.len());
        for info in infos {
            let mut active = info.active.clone();
            if info.lower() != lower {
                for l in &info.lowers {
                    active.guard(iter.clone().ge(l.clone()).simplify());
                }
            }
            if info.upper() != upper {
                for u in &info.uppers {
                    active.guard(iter.clone().le(u.clone()).simplify());
                }
            }
            group.push(active);
        }

        values.push(iter);
        let body = self.scan_level(level + 1, group, values)?;
        values.pop();
        if body.is_empty() {
            return Ok(Vec::new());
        }
        let origin = self.origin(level, infos.iter());
        Ok(vec![AstNode::For { iterator: iterator.clone(), lower, upper, stride: 1, body, origin }])
    }

    fn origin<'b>(&self, level: usize, infos: impl Iterator<Item = &'b LevelBounds>) -> LoopOrigin {
        let axes = infos
            .filter_map(|info| {
                let stage = &self.stages[info.active.stage];
                match &stage.placements[level] {
                    Placement::Axis { axis, .. } => Some((stage.name.clone(), stage.axis_names[*axis].clone())),
                    Placement::Scalar(_) => None,
                }
            })
            .collect();
        LoopOrigin { level, axes }
    }

    fn leaf(&self, active: Active, values: &[AstExpr]) -> AstNode {
        let stage = &self.stages[active.stage];
        let args = stage.axis_exprs.iter().map(|e| self.to_ast(e, values)).collect();
        let stmt = AstNode::Stmt { stage: stage.name.clone(), args };
        match active.guards.into_iter().reduce(AstExpr::and) {
            Some(condition) => AstNode::If { condition, then_body: vec![stmt] },
            None => stmt,
        }
    }

    /// Lower and upper bounds of `t_level` for one stage.
    fn bounds(&self, stage: usize, level: usize, values: &[AstExpr]) -> (Vec<AstExpr>, Vec<AstExpr>) {
        let mut lowers = Vec::new();
        let mut uppers = Vec::new();
        for c in self.stages[stage].projections[level].iter() {
            let a = c.expr.coeff(level);
            if a == 0 {
                continue;
            }
            let mut rest = c.expr.clone();
            rest.set_col(Column::Dim(level), 0);
            match c.kind {
                // a*t + rest >= 0
                ConstraintKind::Inequality if a > 0 => push_unique(&mut lowers, self.ceil_div(-rest, a, values)),
                ConstraintKind::Inequality => push_unique(&mut uppers, self.floor_div(rest, -a, values)),
                ConstraintKind::Equality => {
                    let (num, den) = if a > 0 { (-rest, a) } else { (rest, -a) };
                    push_unique(&mut lowers, self.ceil_div(num.clone(), den, values));
                    push_unique(&mut uppers, self.floor_div(num, den, values));
                }
            }
        }
        keep_tightest_constant(&mut lowers, true);
        keep_tightest_constant(&mut uppers, false);
        (lowers, uppers)
    }

    fn ceil_div(&self, num: AffineExpr, den: i64, values: &[AstExpr]) -> AstExpr {
        let e = self.to_ast(&num, values);
        if den == 1 { e } else { e.ceil_div(AstExpr::Int(den)).simplify() }
    }

    fn floor_div(&self, num: AffineExpr, den: i64, values: &[AstExpr]) -> AstExpr {
        let e = self.to_ast(&num, values);
        if den == 1 { e } else { e.floor_div(AstExpr::Int(den)).simplify() }
    }

    /// An expression over timestamp levels and parameters, with level `l`
    /// replaced by `values[l]`.
    fn to_ast(&self, expr: &AffineExpr, values: &[AstExpr]) -> AstExpr {
        let mut e = AstExpr::Int(expr.constant);
        for (l, &c) in expr.coeffs.iter().enumerate() {
            if c != 0 {
                let v = values.get(l).cloned().unwrap_or_else(|| AstExpr::Var(self.iterators[l].clone()));
                e = e.add(AstExpr::Int(c).mul(v));
            }
        }
        for (p, &c) in expr.param_coeffs.iter().enumerate() {
            if c != 0 {
                e = e.add(AstExpr::Int(c).mul(AstExpr::Var(self.params[p].clone())));
            }
        }
        e.simplify()
    }

    fn condition(&self, c: &Constraint, values: &[AstExpr]) -> AstExpr {
        let e = self.to_ast(&c.expr, values);
        match c.kind {
            ConstraintKind::Inequality => e.ge(AstExpr::Int(0)).simplify(),
            ConstraintKind::Equality => e.equals(AstExpr::Int(0)).simplify(),
        }
    }
}

/// Smallest lower and largest upper bound over all stages; no upper bound
/// if any stage lacks one.
fn union_bounds(infos: &[LevelBounds]) -> (AstExpr, Option<AstExpr>) {
    let lowers: Vec<AstExpr> = infos.iter().map(LevelBounds::lower).collect();
    let uppers: Option<Vec<AstExpr>> = infos.iter().map(LevelBounds::upper).collect();
    let mut distinct_lowers = Vec::new();
    for l in lowers {
        push_unique(&mut distinct_lowers, l);
    }
    keep_tightest_constant(&mut distinct_lowers, false);
    let upper = uppers.map(|uppers| {
        let mut distinct = Vec::new();
        for u in uppers {
            push_unique(&mut distinct, u);
        }
        keep_tightest_constant(&mut distinct, true);
        fold(&distinct, AstExpr::max)
    });
    (fold(&distinct_lowers, AstExpr::min), upper)
}

/// Lift a parameter-only expression into a space of `n_levels` dimensions.
fn lift_params(expr: &AffineExpr, n_levels: usize) -> AffineExpr {
    AffineExpr { constant: expr.constant, coeffs: vec![0; n_levels], param_coeffs: expr.param_coeffs.clone() }
}

impl StageSpace {
    fn new(stage: ScanStage, context: &IntegerSet, n_levels: usize, n_param: usize) -> CompileResult<Option<Self>> {
        let n_axes = stage.axis_names.len();
        let mut axis_exprs = vec![AffineExpr::zero(n_levels, n_param); n_axes];
        let mut primary = vec![None; n_axes];
        for (level, placement) in stage.placements.iter().enumerate() {
            if let Placement::Axis { axis, offset } = placement {
                if primary[*axis].is_none() {
                    primary[*axis] = Some(level);
                    axis_exprs[*axis] = AffineExpr::var(level, n_levels, n_param) - lift_params(offset, n_levels);
                }
            }
        }

        let lift = |e: &AffineExpr| -> Option<AffineExpr> {
            let mut out = lift_params(e, n_levels);
            for (a, axis) in axis_exprs.iter().enumerate() {
                let c = e.coeff(a);
                if c != 0 {
                    out = out.checked_add(&axis.checked_scale(c)?)?;
                }
            }
            Some(out).filter(AffineExpr::is_bounded)
        };

        let mut constraints = Vec::with_capacity(stage.domain.constraints.len() + n_levels);
        for c in stage.domain.constraints.iter() {
            let expr = lift(&c.expr).ok_or_else(|| {
                ConfigError::new(
                    ConfigErrorKind::Overflow,
                    format!("stage `{}`: constraint `{}` overflows once scheduled", stage.name, c),
                )
            })?;
            constraints.push(Constraint::new(expr, c.kind));
        }
        for (level, placement) in stage.placements.iter().enumerate() {
            let t = AffineExpr::var(level, n_levels, n_param);
            match placement {
                Placement::Scalar(e) => constraints.push(Constraint::eq(t, lift_params(e, n_levels))),
                Placement::Axis { axis, offset } if primary[*axis] != Some(level) => {
                    let value = axis_exprs[*axis].clone() + lift_params(offset, n_levels);
                    constraints.push(Constraint::eq(t, value));
                }
                Placement::Axis { .. } => {}
            }
        }

        let mut with_context = ConstraintSystem::new(n_levels, n_param);
        for c in constraints.iter().chain(context.constraints.iter()) {
            let expr = if c.expr.n_dim() == n_levels { c.expr.clone() } else { lift_params(&c.expr, n_levels) };
            with_context.add(Constraint::new(expr, c.kind));
        }
        if operations::is_empty(&with_context) {
            debug!("stage `{}` is empty under the context, dropped", stage.name);
            return Ok(None);
        }

        let mut projections = vec![ConstraintSystem::new(0, n_param); n_levels];
        let mut cur = operations::simplify(constraints, n_levels, n_param);
        for level in (0..n_levels).rev() {
            let next = operations::eliminate(&cur, Column::Dim(level));
            projections[level] = cur;
            cur = next;
        }
        let context_sys = &context.constraints;
        let param_guards = cur.iter().filter(|c| !operations::implies(context_sys, c)).cloned().collect();

        Ok(Some(Self {
            name: stage.name,
            axis_names: stage.axis_names,
            placements: stage.placements,
            axis_exprs,
            projections,
            param_guards,
        }))
    }
}
