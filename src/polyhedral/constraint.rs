//! Affine constraints `expr >= 0` and `expr = 0`, and systems of them.
//!
//! Constraints are kept as written; [`Constraint::tighten`] performs the
//! integer normalisation that projection relies on.

use crate::polyhedral::expr::AffineExpr;
use num_integer::Integer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A linear constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Constraint {
    /// The affine expression (constraint is: expr >= 0 or expr = 0)
    pub expr: AffineExpr,
    /// Kind of constraint
    pub kind: ConstraintKind,
}

/// Kind of constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Greater than or equal: expr >= 0
    Inequality,
    /// Equal: expr = 0
    Equality,
}

impl Constraint {
    pub fn new(expr: AffineExpr, kind: ConstraintKind) -> Self {
        Self { expr, kind }
    }

    /// Create an inequality constraint: expr >= 0
    pub fn ge_zero(expr: AffineExpr) -> Self {
        Self::new(expr, ConstraintKind::Inequality)
    }

    /// Create an equality constraint: expr = 0
    pub fn eq_zero(expr: AffineExpr) -> Self {
        Self::new(expr, ConstraintKind::Equality)
    }

    /// Create a constraint: lhs >= rhs
    pub fn ge(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self::ge_zero(lhs - rhs)
    }

    /// Create a constraint: lhs <= rhs
    pub fn le(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self::ge_zero(rhs - lhs)
    }

    /// Create a constraint: lhs = rhs
    pub fn eq(lhs: AffineExpr, rhs: AffineExpr) -> Self {
        Self::eq_zero(lhs - rhs)
    }

    /// Create a lower bound constraint: var >= lower
    pub fn lower_bound(dim: usize, lower: i64, n_dim: usize, n_param: usize) -> Self {
        let mut expr = AffineExpr::var(dim, n_dim, n_param);
        expr.constant = -lower;
        Self::ge_zero(expr)
    }

    /// Create an upper bound constraint: var <= upper
    pub fn upper_bound(dim: usize, upper: i64, n_dim: usize, n_param: usize) -> Self {
        let mut expr = -AffineExpr::var(dim, n_dim, n_param);
        expr.constant = upper;
        Self::ge_zero(expr)
    }

    /// The unsatisfiable constraint `-1 >= 0`.
    pub fn contradiction(n_dim: usize, n_param: usize) -> Self {
        Self::ge_zero(AffineExpr::constant(-1, n_dim, n_param))
    }

    pub fn is_equality(&self) -> bool {
        matches!(self.kind, ConstraintKind::Equality)
    }

    /// Check if this constraint is satisfied by the given point.
    pub fn is_satisfied(&self, dim_values: &[i64], param_values: &[i64]) -> bool {
        let value = self.expr.evaluate(dim_values, param_values);
        match self.kind {
            ConstraintKind::Inequality => value >= 0,
            ConstraintKind::Equality => value == 0,
        }
    }

    /// Constant constraint that always holds.
    pub fn is_tautology(&self) -> bool {
        match (self.expr.as_constant(), self.kind) {
            (Some(c), ConstraintKind::Inequality) => c >= 0,
            (Some(c), ConstraintKind::Equality) => c == 0,
            (None, _) => false,
        }
    }

    /// Constant constraint that never holds.
    pub fn is_contradiction(&self) -> bool {
        match (self.expr.as_constant(), self.kind) {
            (Some(c), ConstraintKind::Inequality) => c < 0,
            (Some(c), ConstraintKind::Equality) => c != 0,
            (None, _) => false,
        }
    }

    /// The integer complement of an inequality: `expr >= 0` becomes
    /// `-expr - 1 >= 0`. An equality has no single-constraint complement,
    /// and an inequality whose complement overflows has none either.
    pub fn negate(&self) -> Option<Self> {
        match self.kind {
            ConstraintKind::Inequality => {
                let mut neg = self.expr.checked_scale(-1)?;
                neg.constant = neg.constant.checked_sub(1)?;
                Some(Self::ge_zero(neg))
            }
            ConstraintKind::Equality => None,
        }
    }

    /// Divide by the coefficient GCD, rounding the constant toward the
    /// feasible side for inequalities. An equality whose constant is not a
    /// multiple of the GCD has no integer solution and becomes a
    /// contradiction. Equalities are sign-normalised.
    pub fn tighten(&self) -> Self {
        let g = self.expr.coeff_gcd();
        if g == 0 {
            return self.clone();
        }
        match self.kind {
            ConstraintKind::Inequality => {
                if g == 1 {
                    self.clone()
                } else {
                    Self::ge_zero(self.expr.floor_div(g))
                }
            }
            ConstraintKind::Equality => {
                if !Integer::is_multiple_of(&self.expr.constant, &g) {
                    return Self::contradiction(self.expr.n_dim(), self.expr.n_param());
                }
                let mut expr = self.expr.floor_div(g);
                let leading = expr
                    .coeffs
                    .iter()
                    .chain(expr.param_coeffs.iter())
                    .find(|&&c| c != 0)
                    .copied()
                    .unwrap_or(1);
                if leading < 0 {
                    expr = -expr;
                }
                Self::eq_zero(expr)
            }
        }
    }

    /// Convert to string with given names.
    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let expr_str = self.expr.to_string_with_names(dim_names, param_names);
        match self.kind {
            ConstraintKind::Inequality => format!("{} >= 0", expr_str),
            ConstraintKind::Equality => format!("{} = 0", expr_str),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_names(&[], &[]))
    }
}

/// A conjunction of constraints over one layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSystem {
    /// All constraints in the system
    pub constraints: Vec<Constraint>,
    /// Number of dimensions
    pub n_dim: usize,
    /// Number of parameters
    pub n_param: usize,
}

impl ConstraintSystem {
    /// Create an empty constraint system.
    pub fn new(n_dim: usize, n_param: usize) -> Self {
        Self {
            constraints: Vec::new(),
            n_dim,
            n_param,
        }
    }

    /// Add a constraint.
    pub fn add(&mut self, constraint: Constraint) {
        debug_assert_eq!(constraint.expr.n_dim(), self.n_dim);
        debug_assert_eq!(constraint.expr.n_param(), self.n_param);
        self.constraints.push(constraint);
    }

    /// Check if a point satisfies all constraints.
    pub fn is_satisfied(&self, dim_values: &[i64], param_values: &[i64]) -> bool {
        self.constraints.iter().all(|c| c.is_satisfied(dim_values, param_values))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    /// Check if the system has no constraints.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Contains a constant constraint that never holds.
    pub fn has_contradiction(&self) -> bool {
        self.constraints.iter().any(Constraint::is_contradiction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let lo = Constraint::lower_bound(0, 0, 2, 0);
        let hi = Constraint::upper_bound(0, 10, 2, 0);
        assert!(lo.is_satisfied(&[0, 0], &[]));
        assert!(!lo.is_satisfied(&[-1, 0], &[]));
        assert!(hi.is_satisfied(&[10, 0], &[]));
        assert!(!hi.is_satisfied(&[11, 0], &[]));
    }

    #[test]
    fn test_negate() {
        // i - 3 >= 0 negates to 2 - i >= 0
        let c = Constraint::lower_bound(0, 3, 1, 0);
        let n = c.negate().unwrap();
        assert!(n.is_satisfied(&[2], &[]));
        assert!(!n.is_satisfied(&[3], &[]));

        let mut e = AffineExpr::var(0, 1, 0);
        e.constant = i64::MIN;
        assert!(Constraint::ge_zero(e).negate().is_none());
    }

    #[test]
    fn test_tighten_inequality() {
        // 2i - 3 >= 0  ->  i - 2 >= 0
        let mut e = AffineExpr::zero(1, 0);
        e.coeffs = vec![2];
        e.constant = -3;
        let t = Constraint::ge_zero(e).tighten();
        assert_eq!(t.expr.coeffs, vec![1]);
        assert_eq!(t.expr.constant, -2);
    }

    #[test]
    fn test_tighten_equality() {
        // 2i - 3 = 0 has no integer solution
        let mut e = AffineExpr::zero(1, 0);
        e.coeffs = vec![2];
        e.constant = -3;
        assert!(Constraint::eq_zero(e.clone()).tighten().is_contradiction());
        // -2i + 4 = 0  ->  i - 2 = 0
        e.coeffs = vec![-2];
        e.constant = 4;
        let t = Constraint::eq_zero(e).tighten();
        assert_eq!(t.expr.coeffs, vec![1]);
        assert_eq!(t.expr.constant, -2);
    }

    #[test]
    fn test_constraint_system() {
        let mut sys = ConstraintSystem::new(2, 0);
        sys.add(Constraint::lower_bound(0, 0, 2, 0));
        sys.add(Constraint::upper_bound(0, 9, 2, 0));
        sys.add(Constraint::lower_bound(1, 0, 2, 0));
        sys.add(Constraint::upper_bound(1, 9, 2, 0));
        assert!(sys.is_satisfied(&[9, 9], &[]));
        assert!(!sys.is_satisfied(&[10, 0], &[]));
        assert!(!sys.has_contradiction());
    }
}
