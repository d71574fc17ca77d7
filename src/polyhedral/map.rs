//! Affine maps for schedules.

use crate::polyhedral::expr::AffineExpr;
use crate::polyhedral::space::Space;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single-valued affine map: each output is an affine expression over
/// the input dimensions and parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffineMap {
    pub space: Space,
    /// Output expressions (one per output dimension)
    pub outputs: Vec<AffineExpr>,
}

impl AffineMap {
    /// Identity map of given dimension.
    pub fn identity(n_dim: usize, n_param: usize) -> Self {
        let outputs = (0..n_dim).map(|i| AffineExpr::var(i, n_dim, n_param)).collect();
        Self { space: Space::map_with_params(n_dim, n_dim, n_param), outputs }
    }

    /// Create from output expressions.
    pub fn from_outputs(n_in: usize, n_param: usize, outputs: Vec<AffineExpr>) -> Self {
        let n_out = outputs.len();
        Self { space: Space::map_with_params(n_in, n_out, n_param), outputs }
    }

    pub fn with_names(mut self, in_names: Vec<String>, param_names: Vec<String>) -> Self {
        self.space = self.space.with_dim_names(in_names).with_param_names(param_names);
        self
    }

    /// Get input dimensions.
    pub fn n_in(&self) -> usize {
        self.space.n_in
    }

    /// Get output dimensions.
    pub fn n_out(&self) -> usize {
        self.outputs.len()
    }

    pub fn n_param(&self) -> usize {
        self.space.n_param
    }

    pub fn param_names(&self) -> Vec<String> {
        self.space.all_param_names()
    }

    /// Apply the map to a point.
    pub fn apply(&self, input: &[i64], params: &[i64]) -> Vec<i64> {
        self.outputs.iter().map(|expr| expr.evaluate(input, params)).collect()
    }

    /// Append a constant output dimension.
    pub fn push_constant(&mut self, value: i64) {
        self.outputs.push(AffineExpr::constant(value, self.n_in(), self.n_param()));
        self.space.n_dim = self.outputs.len();
    }

    /// Re-express over the parameter list `global`.
    pub fn align_params(&self, global: &[String]) -> Option<AffineMap> {
        let positions = self.space.param_positions(global)?;
        let outputs = self.outputs.iter().map(|e| e.remap_params(&positions, global.len())).collect();
        Some(AffineMap {
            space: self.space.clone().with_param_names(global.to_vec()),
            outputs,
        })
    }

    /// Check if this is an identity map.
    pub fn is_identity(&self) -> bool {
        self.n_in() == self.n_out()
            && self
                .outputs
                .iter()
                .enumerate()
                .all(|(i, e)| *e == AffineExpr::var(i, self.n_in(), self.n_param()))
    }
}

impl fmt::Display for AffineMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let in_names = self.space.all_dim_names();
        let param_names = self.param_names();
        if !param_names.is_empty() {
            write!(f, "[{}] -> ", param_names.join(", "))?;
        }
        let outs: Vec<String> = self
            .outputs
            .iter()
            .map(|e| e.to_string_with_names(&in_names, &param_names))
            .collect();
        write!(f, "{{ [{}] -> [{}] }}", in_names.join(", "), outs.join(", "))
    }
}
