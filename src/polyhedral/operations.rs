//! Projection and emptiness by Fourier–Motzkin elimination.
//!
//! Elimination is exact over the rationals. Each derived constraint is
//! tightened by its coefficient GCD, which removes most of the integer
//! slack; what remains is an over-approximation of the integer shadow.
//! Callers use projections for loop bounds, where a too-wide outer range
//! only yields empty inner ranges, never wrong points.
//!
//! A derived constraint with a term beyond [`MAX_MAGNITUDE`] is dropped,
//! which only widens the projection further.

use crate::polyhedral::constraint::{Constraint, ConstraintKind, ConstraintSystem};
use crate::polyhedral::expr::{AffineExpr, Column, MAX_MAGNITUDE};
use log::trace;
use std::collections::BTreeMap;

/// Remove `col` from `sys`, keeping every constraint implied on the rest.
pub fn eliminate(sys: &ConstraintSystem, col: Column) -> ConstraintSystem {
    let (n_dim, n_param) = match col {
        Column::Dim(_) => (sys.n_dim - 1, sys.n_param),
        Column::Param(_) => (sys.n_dim, sys.n_param - 1),
    };
    let sys = simplify(sys.constraints.clone(), sys.n_dim, sys.n_param);
    if sys.has_contradiction() {
        return simplify(vec![Constraint::contradiction(n_dim, n_param)], n_dim, n_param);
    }

    // Prefer substitution through an equality: it keeps the system small
    // and is exact when the pivot coefficient is a unit.
    let pivot = sys
        .constraints
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_equality() && c.expr.col(col) != 0)
        .min_by_key(|(_, c)| c.expr.col(col).abs())
        .map(|(i, _)| i);

    let derived: Vec<Option<Constraint>> = if let Some(p) = pivot {
        let eq = &sys.constraints[p].expr;
        let a = eq.col(col);
        sys.constraints
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != p)
            .map(|(_, c)| {
                let b = c.expr.col(col);
                if b == 0 {
                    return Some(c.clone());
                }
                let lhs = c.expr.checked_scale(a.abs())?;
                let rhs = eq.checked_scale(a.signum().checked_mul(b)?.checked_neg()?)?;
                Some(Constraint::new(lhs.checked_add(&rhs)?, c.kind))
            })
            .collect()
    } else {
        let mut lower = Vec::new();
        let mut upper = Vec::new();
        let mut rest = Vec::new();
        for c in &sys.constraints {
            match c.expr.col(col) {
                0 => rest.push(Some(c.clone())),
                k if k > 0 => lower.push(c),
                _ => upper.push(c),
            }
        }
        for lo in &lower {
            for up in &upper {
                let a = lo.expr.col(col);
                let b = up.expr.col(col).checked_neg();
                rest.push(combine(&lo.expr, b, &up.expr, a));
            }
        }
        rest
    };

    let mut constraints = Vec::with_capacity(derived.len());
    for c in derived {
        match c.map(|c| c.tighten()) {
            Some(mut c) if c.expr.is_bounded() => {
                c.expr.remove_col(col);
                constraints.push(c);
            }
            _ => trace!("eliminating {:?}: dropped a constraint that overflows", col),
        }
    }
    simplify(constraints, n_dim, n_param)
}

/// `b * lo + a * up >= 0`, or `None` on overflow.
fn combine(lo: &AffineExpr, b: Option<i64>, up: &AffineExpr, a: i64) -> Option<Constraint> {
    let sum = lo.checked_scale(b?)?.checked_add(&up.checked_scale(a)?)?;
    Some(Constraint::ge_zero(sum))
}

/// Tighten, drop tautologies and duplicates, keep only the strongest of
/// parallel inequalities. A contradiction collapses the system to `-1 >= 0`.
pub fn simplify(constraints: Vec<Constraint>, n_dim: usize, n_param: usize) -> ConstraintSystem {
    let mut out = ConstraintSystem::new(n_dim, n_param);
    let mut strongest: BTreeMap<(Vec<i64>, Vec<i64>), i64> = BTreeMap::new();
    let mut equalities: Vec<Constraint> = Vec::new();
    for c in constraints {
        let c = c.tighten();
        if c.is_contradiction() {
            out.add(Constraint::contradiction(n_dim, n_param));
            return out;
        }
        if c.is_tautology() {
            continue;
        }
        match c.kind {
            ConstraintKind::Equality => {
                if !equalities.contains(&c) {
                    equalities.push(c);
                }
            }
            ConstraintKind::Inequality => {
                let key = (c.expr.coeffs.clone(), c.expr.param_coeffs.clone());
                let slot = strongest.entry(key).or_insert(c.expr.constant);
                *slot = (*slot).min(c.expr.constant);
            }
        }
    }

    // `e + c1 >= 0` and `-e + c2 >= 0` with c1 + c2 < 0 cannot both hold.
    for ((coeffs, params), &c1) in &strongest {
        let neg = (coeffs.iter().map(|c| -c).collect::<Vec<_>>(), params.iter().map(|c| -c).collect::<Vec<_>>());
        if let Some(&c2) = strongest.get(&neg) {
            if i128::from(c1) + i128::from(c2) < 0 {
                out.add(Constraint::contradiction(n_dim, n_param));
                return out;
            }
        }
    }

    for c in equalities {
        out.add(c);
    }
    for ((coeffs, param_coeffs), constant) in strongest {
        out.add(Constraint::ge_zero(AffineExpr { constant, coeffs, param_coeffs }));
    }
    out
}

/// Eliminate dimensions `from..` (highest first).
pub fn project_out_dims_from(sys: &ConstraintSystem, from: usize) -> ConstraintSystem {
    let mut cur = sys.clone();
    for d in (from..sys.n_dim).rev() {
        cur = eliminate(&cur, Column::Dim(d));
    }
    cur
}

/// Eliminate every parameter.
pub fn project_out_params(sys: &ConstraintSystem) -> ConstraintSystem {
    let mut cur = sys.clone();
    for p in (0..sys.n_param).rev() {
        cur = eliminate(&cur, Column::Param(p));
    }
    cur
}

/// True if no integer point (for any parameter values) satisfies `sys`,
/// as far as elimination can tell.
pub fn is_empty(sys: &ConstraintSystem) -> bool {
    let sys = simplify(sys.constraints.clone(), sys.n_dim, sys.n_param);
    if sys.has_contradiction() {
        return true;
    }
    let no_dims = project_out_dims_from(&sys, 0);
    project_out_params(&no_dims).has_contradiction()
}

/// Constant bounds of dimension `dim`, independent of parameters and of
/// the other dimensions.
pub fn dim_const_bounds(sys: &ConstraintSystem, dim: usize) -> (Option<i64>, Option<i64>) {
    let mut cur = project_out_params(sys);
    for d in (0..sys.n_dim).rev() {
        if d != dim {
            cur = eliminate(&cur, Column::Dim(d));
        }
    }
    // Only `dim` is left, at index 0.
    let mut lower: Option<i64> = None;
    let mut upper: Option<i64> = None;
    let mut tighten_lo = |v: i64| lower = Some(lower.map_or(v, |l: i64| l.max(v)));
    for c in cur.iter() {
        let a = c.expr.coeff(0);
        let k = c.expr.constant;
        if a == 0 {
            continue;
        }
        // After tightening, |a| == 1 for single-variable constraints.
        match c.kind {
            ConstraintKind::Equality => {
                tighten_lo(-k * a);
                upper = Some(upper.map_or(-k * a, |u: i64| u.min(-k * a)));
            }
            ConstraintKind::Inequality if a > 0 => tighten_lo(-k),
            ConstraintKind::Inequality => upper = Some(upper.map_or(k, |u: i64| u.min(k))),
        }
    }
    (lower, upper)
}

/// Whether `context` (a parameter-only system) implies `c`.
pub fn implies(context: &ConstraintSystem, c: &Constraint) -> bool {
    if c.is_tautology() {
        return true;
    }
    let halves = match c.kind {
        ConstraintKind::Inequality => vec![c.clone()],
        ConstraintKind::Equality => vec![
            Constraint::ge_zero(c.expr.clone()),
            Constraint::ge_zero(-c.expr.clone()),
        ],
    };
    halves.iter().all(|half| {
        let Some(negated) = half.negate() else { return false };
        let mut test = context.clone();
        test.add(negated);
        is_empty(&test)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(constant: i64, coeffs: &[i64], params: &[i64]) -> AffineExpr {
        AffineExpr { constant, coeffs: coeffs.to_vec(), param_coeffs: params.to_vec() }
    }

    #[test]
    fn test_triangle_projection() {
        // { [i, j] : 0 <= j <= i <= N - 1 }, eliminate j -> 0 <= i <= N - 1
        let mut sys = ConstraintSystem::new(2, 1);
        sys.add(Constraint::ge_zero(expr(0, &[0, 1], &[0])));
        sys.add(Constraint::ge_zero(expr(0, &[1, -1], &[0])));
        sys.add(Constraint::ge_zero(expr(-1, &[-1, 0], &[1])));
        let p = eliminate(&sys, Column::Dim(1));
        assert_eq!(p.n_dim, 1);
        assert!(p.is_satisfied(&[0], &[1]));
        assert!(p.is_satisfied(&[4], &[5]));
        assert!(!p.is_satisfied(&[-1], &[5]));
        assert!(!p.is_satisfied(&[5], &[5]));
    }

    #[test]
    fn test_equality_substitution() {
        // { [i, j] : j = i + 1 and 0 <= j <= 3 } -> -1 <= i <= 2
        let mut sys = ConstraintSystem::new(2, 0);
        sys.add(Constraint::eq_zero(expr(1, &[1, -1], &[])));
        sys.add(Constraint::lower_bound(1, 0, 2, 0));
        sys.add(Constraint::upper_bound(1, 3, 2, 0));
        assert_eq!(dim_const_bounds(&sys, 0), (Some(-1), Some(2)));
    }

    #[test]
    fn test_emptiness() {
        let mut sys = ConstraintSystem::new(1, 1);
        sys.add(Constraint::ge_zero(expr(0, &[1], &[0])));
        sys.add(Constraint::ge_zero(expr(-1, &[-1], &[0])));
        assert!(is_empty(&sys));

        // 2i = 1 has no integer solution
        let mut sys = ConstraintSystem::new(1, 0);
        sys.add(Constraint::eq_zero(expr(-1, &[2], &[])));
        assert!(is_empty(&sys));

        // 0 <= i < N is non-empty for some N
        let mut sys = ConstraintSystem::new(1, 1);
        sys.add(Constraint::ge_zero(expr(0, &[1], &[0])));
        sys.add(Constraint::ge_zero(expr(-1, &[-1], &[1])));
        assert!(!is_empty(&sys));
    }

    #[test]
    fn test_fixed_dim_bounds() {
        // { [i, j] : i = 0 and 0 <= j < 8 }
        let mut sys = ConstraintSystem::new(2, 0);
        sys.add(Constraint::eq_zero(expr(0, &[1, 0], &[])));
        sys.add(Constraint::lower_bound(1, 0, 2, 0));
        sys.add(Constraint::upper_bound(1, 7, 2, 0));
        assert_eq!(dim_const_bounds(&sys, 0), (Some(0), Some(0)));
        assert_eq!(dim_const_bounds(&sys, 1), (Some(0), Some(7)));
    }

    #[test]
    fn test_overflowing_combination_is_dropped() {
        // 3^25 x + y + 2^61 >= 0, -5^17 x - y + 2^61 >= 0, y >= 0
        let (a, b) = (3i64.pow(25), 5i64.pow(17));
        let mut sys = ConstraintSystem::new(2, 0);
        sys.add(Constraint::ge_zero(expr(1 << 61, &[a, 1], &[])));
        sys.add(Constraint::ge_zero(expr(1 << 61, &[-b, -1], &[])));
        sys.add(Constraint::lower_bound(1, 0, 2, 0));
        let p = eliminate(&sys, Column::Dim(0));
        assert_eq!(p.n_dim, 1);
        assert!(p.is_satisfied(&[5], &[]));
        assert!(!p.is_satisfied(&[-1], &[]));
    }

    #[test]
    fn test_extreme_parallel_bounds() {
        // -2^62 <= x <= 2^62: the opposite constants sum past i64::MAX
        let mut sys = ConstraintSystem::new(1, 0);
        sys.add(Constraint::ge_zero(expr(MAX_MAGNITUDE, &[1], &[])));
        sys.add(Constraint::ge_zero(expr(MAX_MAGNITUDE, &[-1], &[])));
        assert!(!is_empty(&sys));
        assert_eq!(dim_const_bounds(&sys, 0), (Some(-MAX_MAGNITUDE), Some(MAX_MAGNITUDE)));
    }

    #[test]
    fn test_implies() {
        // N >= 4 implies N >= 1 but not N >= 5
        let mut ctx = ConstraintSystem::new(0, 1);
        ctx.add(Constraint::ge_zero(expr(-4, &[], &[1])));
        assert!(implies(&ctx, &Constraint::ge_zero(expr(-1, &[], &[1]))));
        assert!(!implies(&ctx, &Constraint::ge_zero(expr(-5, &[], &[1]))));
    }
}
