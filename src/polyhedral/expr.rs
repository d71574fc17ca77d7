//! Integer affine forms over set dimensions and parameters.
//!
//! `c + a1*x1 + ... + an*xn + b1*p1 + ... + bm*pm`, with the coefficient
//! layout fixed by the enclosing [`Space`](crate::polyhedral::Space).

use num_integer::Integer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Bound on the absolute value of every constant and coefficient kept in
/// a constraint system. Negations and pairwise sums of such values stay
/// within `i64`.
pub const MAX_MAGNITUDE: i64 = 1 << 62;

/// A variable position inside an affine expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Dim(usize),
    Param(usize),
}

/// An affine expression: constant + sum(coeff[i] * var[i]) + sum(param_coeff[j] * param[j])
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AffineExpr {
    /// Constant term
    pub constant: i64,
    /// Coefficients for each dimension (index = dimension index)
    pub coeffs: Vec<i64>,
    /// Coefficients for parameters (index = parameter index)
    pub param_coeffs: Vec<i64>,
}

impl AffineExpr {
    /// Create a zero expression.
    pub fn zero(n_dim: usize, n_param: usize) -> Self {
        Self {
            constant: 0,
            coeffs: vec![0; n_dim],
            param_coeffs: vec![0; n_param],
        }
    }

    /// Create a constant expression.
    pub fn constant(value: i64, n_dim: usize, n_param: usize) -> Self {
        Self { constant: value, ..Self::zero(n_dim, n_param) }
    }

    /// Create an expression for a single dimension variable.
    pub fn var(dim: usize, n_dim: usize, n_param: usize) -> Self {
        let mut expr = Self::zero(n_dim, n_param);
        expr.set_col(Column::Dim(dim), 1);
        expr
    }

    /// Create an expression for a parameter.
    pub fn param(param_idx: usize, n_dim: usize, n_param: usize) -> Self {
        let mut expr = Self::zero(n_dim, n_param);
        expr.set_col(Column::Param(param_idx), 1);
        expr
    }

    /// Check if this is a constant expression.
    pub fn is_constant(&self) -> bool {
        self.is_param_only() && self.param_coeffs.iter().all(|&c| c == 0)
    }

    /// No dimension appears with a nonzero coefficient.
    pub fn is_param_only(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0)
    }

    /// Get the constant value if this is a constant expression.
    pub fn as_constant(&self) -> Option<i64> {
        if self.is_constant() { Some(self.constant) } else { None }
    }

    pub fn n_dim(&self) -> usize {
        self.coeffs.len()
    }

    pub fn n_param(&self) -> usize {
        self.param_coeffs.len()
    }

    /// Get coefficient for a dimension.
    pub fn coeff(&self, dim: usize) -> i64 {
        self.coeffs.get(dim).copied().unwrap_or(0)
    }

    /// Get coefficient for a parameter.
    pub fn param_coeff(&self, idx: usize) -> i64 {
        self.param_coeffs.get(idx).copied().unwrap_or(0)
    }

    pub fn col(&self, col: Column) -> i64 {
        match col {
            Column::Dim(d) => self.coeff(d),
            Column::Param(p) => self.param_coeff(p),
        }
    }

    pub fn set_col(&mut self, col: Column, value: i64) {
        let slot = match col {
            Column::Dim(d) => self.coeffs.get_mut(d),
            Column::Param(p) => self.param_coeffs.get_mut(p),
        };
        if let Some(slot) = slot {
            *slot = value;
        }
    }

    /// Drop a column, shifting the later ones down.
    pub fn remove_col(&mut self, col: Column) {
        match col {
            Column::Dim(d) if d < self.coeffs.len() => {
                self.coeffs.remove(d);
            }
            Column::Param(p) if p < self.param_coeffs.len() => {
                self.param_coeffs.remove(p);
            }
            _ => {}
        }
    }

    /// Dimensions with a nonzero coefficient.
    pub fn dims_used(&self) -> Vec<usize> {
        self.coeffs.iter().enumerate().filter(|(_, &c)| c != 0).map(|(i, _)| i).collect()
    }

    /// Evaluate the expression given concrete values.
    pub fn evaluate(&self, dim_values: &[i64], param_values: &[i64]) -> i64 {
        let dims: i64 = self.coeffs.iter().zip(dim_values).map(|(&c, &v)| c * v).sum();
        let params: i64 = self.param_coeffs.iter().zip(param_values).map(|(&c, &v)| c * v).sum();
        self.constant + dims + params
    }

    /// Scale the expression by a constant.
    pub fn scale(&self, factor: i64) -> Self {
        Self {
            constant: self.constant * factor,
            coeffs: self.coeffs.iter().map(|&c| c * factor).collect(),
            param_coeffs: self.param_coeffs.iter().map(|&c| c * factor).collect(),
        }
    }

    /// [`scale`](Self::scale), or `None` if a term overflows.
    pub fn checked_scale(&self, factor: i64) -> Option<Self> {
        let mul = |v: &[i64]| v.iter().map(|&c| c.checked_mul(factor)).collect::<Option<Vec<_>>>();
        Some(Self {
            constant: self.constant.checked_mul(factor)?,
            coeffs: mul(&self.coeffs)?,
            param_coeffs: mul(&self.param_coeffs)?,
        })
    }

    /// Termwise sum, or `None` if a term overflows.
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        let add = |a: &[i64], b: &[i64]| a.iter().zip(b).map(|(&x, &y)| x.checked_add(y)).collect::<Option<Vec<_>>>();
        Some(Self {
            constant: self.constant.checked_add(other.constant)?,
            coeffs: add(&self.coeffs, &other.coeffs)?,
            param_coeffs: add(&self.param_coeffs, &other.param_coeffs)?,
        })
    }

    /// Largest absolute value among the constant and the coefficients.
    pub fn magnitude(&self) -> u64 {
        std::iter::once(&self.constant)
            .chain(&self.coeffs)
            .chain(&self.param_coeffs)
            .map(|c| c.unsigned_abs())
            .max()
            .unwrap_or(0)
    }

    /// Every term is within [`MAX_MAGNITUDE`].
    pub fn is_bounded(&self) -> bool {
        self.magnitude() <= MAX_MAGNITUDE as u64
    }

    /// Replace dimension `dim` by `repl` (an expression in the same space).
    pub fn substitute_dim(&self, dim: usize, repl: &AffineExpr) -> Self {
        let c = self.coeff(dim);
        if c == 0 {
            return self.clone();
        }
        let mut base = self.clone();
        base.set_col(Column::Dim(dim), 0);
        base + repl.scale(c)
    }

    /// Re-express in a space with `n_param` parameters, moving parameter
    /// `i` to `param_map[i]`.
    pub fn remap_params(&self, param_map: &[usize], n_param: usize) -> Self {
        let mut param_coeffs = vec![0; n_param];
        for (i, &c) in self.param_coeffs.iter().enumerate() {
            if c != 0 {
                param_coeffs[param_map[i]] += c;
            }
        }
        Self { constant: self.constant, coeffs: self.coeffs.clone(), param_coeffs }
    }

    /// GCD of the variable coefficients (0 if there are none).
    pub fn coeff_gcd(&self) -> i64 {
        self.coeffs
            .iter()
            .chain(self.param_coeffs.iter())
            .fold(0i64, |g, &c| Integer::gcd(&g, &c))
    }

    /// Divide every coefficient by `divisor`, flooring the constant.
    ///
    /// Exact on the variable part when `divisor` divides all coefficients.
    pub fn floor_div(&self, divisor: i64) -> Self {
        Self {
            constant: Integer::div_floor(&self.constant, &divisor),
            coeffs: self.coeffs.iter().map(|&c| c / divisor).collect(),
            param_coeffs: self.param_coeffs.iter().map(|&c| c / divisor).collect(),
        }
    }

    /// Convert to string with given dimension and parameter names.
    pub fn to_string_with_names(&self, dim_names: &[String], param_names: &[String]) -> String {
        let mut parts = Vec::new();
        let mut term = |c: i64, name: &str| {
            if c == 1 {
                parts.push(name.to_string());
            } else if c == -1 {
                parts.push(format!("-{}", name));
            } else if c != 0 {
                parts.push(format!("{}*{}", c, name));
            }
        };
        for (i, &c) in self.coeffs.iter().enumerate() {
            let default_name = format!("d{}", i);
            term(c, dim_names.get(i).map(|s| s.as_str()).unwrap_or(&default_name));
        }
        for (i, &c) in self.param_coeffs.iter().enumerate() {
            let default_name = format!("p{}", i);
            term(c, param_names.get(i).map(|s| s.as_str()).unwrap_or(&default_name));
        }
        if self.constant != 0 || parts.is_empty() {
            parts.push(self.constant.to_string());
        }
        parts.join(" + ").replace("+ -", "- ")
    }
}

impl Add for AffineExpr {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        debug_assert_eq!(self.coeffs.len(), other.coeffs.len());
        debug_assert_eq!(self.param_coeffs.len(), other.param_coeffs.len());
        Self {
            constant: self.constant + other.constant,
            coeffs: self.coeffs.iter().zip(&other.coeffs).map(|(&a, &b)| a + b).collect(),
            param_coeffs: self.param_coeffs.iter().zip(&other.param_coeffs).map(|(&a, &b)| a + b).collect(),
        }
    }
}

impl Sub for AffineExpr {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self + (-other)
    }
}

impl Neg for AffineExpr {
    type Output = Self;

    fn neg(self) -> Self {
        self.scale(-1)
    }
}

impl fmt::Display for AffineExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with_names(&[], &[]))
    }
}
