//! Correction of single-valued domain axes.
//!
//! An axis fixed to one value `v` has equal lower and upper bounds, so a
//! scanner would bind it without a loop and the stage's axes would no
//! longer line up with the generated loop iterators. Each such axis is
//! rewritten to `v <= i <= _const_n` with `_const_n <= v` in both the
//! domain and the context, and `_const_n >= v` in the context only. The
//! set of points is unchanged, but the two bounds now differ
//! syntactically and the axis keeps its loop.

use crate::polyhedral::constraint::Constraint;
use crate::polyhedral::domain::IterationDomain;
use crate::polyhedral::expr::AffineExpr;
use crate::polyhedral::set::IntegerSet;
use log::debug;

/// Prefix of the parameters introduced by [`correct_degenerate_axes`].
/// User parameters may share it; only the returned bindings say which
/// parameters were introduced.
pub const CONST_PARAM_PREFIX: &str = "_const_";

/// A parameter standing in for a fixed axis value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstBinding {
    pub param: String,
    pub stage: String,
    pub axis: String,
    pub value: i64,
}

/// Rewrite every single-valued axis of `domains`, in stage order then
/// axis order. `context` and all domains must share one parameter list;
/// every new parameter is appended to all of them.
pub fn correct_degenerate_axes(context: &mut IntegerSet, domains: &mut [IterationDomain]) -> Vec<ConstBinding> {
    let mut fixed = Vec::new();
    for (s, domain) in domains.iter().enumerate() {
        for d in 0..domain.n_dim() {
            if let (Some(lo), Some(hi)) = domain.set.dim_const_bounds(d) {
                if lo == hi {
                    fixed.push((s, d, lo));
                }
            }
        }
    }

    let mut bindings = Vec::with_capacity(fixed.len());
    let mut counter = 0usize;
    for (s, d, value) in fixed {
        let existing = context.param_names();
        let param = loop {
            let candidate = format!("{}{}", CONST_PARAM_PREFIX, counter);
            counter += 1;
            if !existing.contains(&candidate) {
                break candidate;
            }
        };

        let k = context.add_param(&param);
        for domain in domains.iter_mut() {
            domain.set.add_param(&param);
        }

        let n_param = context.n_param();
        let k_ctx = AffineExpr::param(k, 0, n_param);
        let v_ctx = AffineExpr::constant(value, 0, n_param);
        context.add_constraint(Constraint::le(k_ctx.clone(), v_ctx.clone()));
        context.add_constraint(Constraint::ge(k_ctx, v_ctx));

        let domain = &mut domains[s];
        let set = &mut domain.set;
        let n_dim = set.dim();
        set.constraints.constraints.retain(|c| !only_mentions_dim(&c.expr, d));
        let axis = AffineExpr::var(d, n_dim, n_param);
        let k_dom = AffineExpr::param(k, n_dim, n_param);
        let v_dom = AffineExpr::constant(value, n_dim, n_param);
        set.add_constraint(Constraint::ge(axis.clone(), v_dom.clone()));
        set.add_constraint(Constraint::le(axis, k_dom.clone()));
        set.add_constraint(Constraint::le(k_dom, v_dom));

        let axis = domain.axis_names()[d].clone();
        debug!("stage `{}`: axis `{}` is fixed to {}, bounded by `{}`", domain.name, axis, value, param);
        bindings.push(ConstBinding { param, stage: domain.name.clone(), axis, value });
    }
    bindings
}

fn only_mentions_dim(expr: &AffineExpr, dim: usize) -> bool {
    expr.dims_used() == [dim] && expr.param_coeffs.iter().all(|&c| c == 0)
}
