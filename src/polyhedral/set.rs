//! Integer sets (polyhedra) for iteration domains and contexts.

use crate::polyhedral::constraint::{Constraint, ConstraintSystem};
use crate::polyhedral::operations;
use crate::polyhedral::space::Space;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An integer set defined by a conjunction of affine constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegerSet {
    pub space: Space,
    pub constraints: ConstraintSystem,
}

impl IntegerSet {
    pub fn from_space(space: Space) -> Self {
        let constraints = ConstraintSystem::new(space.n_dim, space.n_param);
        Self { space, constraints }
    }

    /// Unconstrained parameter-only set.
    pub fn universe_params(param_names: Vec<String>) -> Self {
        Self::from_space(Space::params(param_names))
    }

    /// `{ [d0, ...] : 0 <= d_k < bounds[k] }` with named dimensions.
    pub fn rectangular(names: &[&str], bounds: &[i64]) -> Self {
        let n_dim = bounds.len();
        let space = Space::set_with_params(n_dim, 0)
            .with_dim_names(names.iter().map(|s| s.to_string()).collect());
        let mut set = Self::from_space(space);
        for (i, &bound) in bounds.iter().enumerate() {
            set.add_constraint(Constraint::lower_bound(i, 0, n_dim, 0));
            set.add_constraint(Constraint::upper_bound(i, bound - 1, n_dim, 0));
        }
        set
    }

    pub fn dim(&self) -> usize {
        self.space.n_dim
    }

    pub fn n_param(&self) -> usize {
        self.space.n_param
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.add(constraint);
    }

    pub fn contains(&self, point: &[i64], params: &[i64]) -> bool {
        self.constraints.is_satisfied(point, params)
    }

    pub fn dim_names(&self) -> Vec<String> {
        self.space.all_dim_names()
    }

    pub fn param_names(&self) -> Vec<String> {
        self.space.all_param_names()
    }

    /// Whether the set has no integer points for any parameter values.
    pub fn is_empty(&self) -> bool {
        operations::is_empty(&self.constraints)
    }

    /// Constant bounds of one dimension; see [`operations::dim_const_bounds`].
    pub fn dim_const_bounds(&self, dim: usize) -> (Option<i64>, Option<i64>) {
        operations::dim_const_bounds(&self.constraints, dim)
    }

    /// Append a parameter and return its index. Existing constraints do
    /// not mention it.
    pub fn add_param(&mut self, name: &str) -> usize {
        let mut names = self.param_names();
        names.push(name.to_string());
        self.space = self.space.clone().with_param_names(names);
        self.constraints.n_param += 1;
        for c in &mut self.constraints.constraints {
            c.expr.param_coeffs.push(0);
        }
        self.constraints.n_param - 1
    }

    /// Re-express over the parameter list `global`, which must contain
    /// every parameter of this set.
    pub fn align_params(&self, global: &[String]) -> Option<IntegerSet> {
        let positions = self.space.param_positions(global)?;
        let mut constraints = ConstraintSystem::new(self.dim(), global.len());
        for c in self.constraints.iter() {
            constraints.add(Constraint::new(c.expr.remap_params(&positions, global.len()), c.kind));
        }
        let space = self.space.clone().with_param_names(global.to_vec());
        Some(IntegerSet { space, constraints })
    }
}

impl fmt::Display for IntegerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dim_names = self.dim_names();
        let param_names = self.param_names();
        if !param_names.is_empty() {
            write!(f, "[{}] -> ", param_names.join(", "))?;
        }
        write!(f, "{{ ")?;
        if self.dim() > 0 {
            write!(f, "[{}]", dim_names.join(", "))?;
        }
        if !self.constraints.is_empty() {
            write!(f, " : ")?;
            for (i, c) in self.constraints.iter().enumerate() {
                if i > 0 {
                    write!(f, " and ")?;
                }
                write!(f, "{}", c.to_string_with_names(&dim_names, &param_names))?;
            }
        }
        write!(f, " }}")
    }
}
