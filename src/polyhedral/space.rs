//! Named spaces of integer sets and maps.
//!
//! A space fixes the layout of every affine expression living in it:
//! - Input dimensions (maps only)
//! - Set/output dimensions
//! - Parameters (symbolic constants, shared by name across spaces)

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Space {
    /// Number of set/output dimensions
    pub n_dim: usize,
    /// Number of parameter dimensions
    pub n_param: usize,
    /// Number of input dimensions (for maps only)
    pub n_in: usize,
    /// Names of dimensions (input dimensions for maps)
    pub dim_names: Vec<String>,
    /// Names of parameters
    pub param_names: Vec<String>,
}

impl Space {
    /// Create a new set space with parameters.
    pub fn set_with_params(n_dim: usize, n_param: usize) -> Self {
        Self {
            n_dim,
            n_param,
            n_in: 0,
            dim_names: Vec::new(),
            param_names: Vec::new(),
        }
    }

    /// Create a new map space with parameters.
    pub fn map_with_params(n_in: usize, n_out: usize, n_param: usize) -> Self {
        Self {
            n_dim: n_out,
            n_param,
            n_in,
            dim_names: Vec::new(),
            param_names: Vec::new(),
        }
    }

    /// A parameter-only space, as used by contexts.
    pub fn params(names: Vec<String>) -> Self {
        Self::set_with_params(0, names.len()).with_param_names(names)
    }

    /// Check if this is a map space (has input dimensions).
    pub fn is_map(&self) -> bool {
        self.n_in > 0
    }

    /// Set dimension names.
    pub fn with_dim_names(mut self, names: Vec<String>) -> Self {
        self.dim_names = names;
        self
    }

    /// Set parameter names.
    pub fn with_param_names(mut self, names: Vec<String>) -> Self {
        self.n_param = names.len();
        self.param_names = names;
        self
    }

    pub fn dim_index(&self, name: &str) -> Option<usize> {
        self.dim_names.iter().position(|n| n == name)
    }

    /// Get all dimension names with defaults.
    pub fn all_dim_names(&self) -> Vec<String> {
        let n = if self.is_map() { self.n_in } else { self.n_dim };
        (0..n)
            .map(|i| self.dim_names.get(i).cloned().unwrap_or_else(|| format!("d{}", i)))
            .collect()
    }

    /// Get all parameter names with defaults.
    pub fn all_param_names(&self) -> Vec<String> {
        (0..self.n_param)
            .map(|i| self.param_names.get(i).cloned().unwrap_or_else(|| format!("p{}", i)))
            .collect()
    }

    /// Positions of this space's parameters inside `global`.
    ///
    /// Returns `None` if one of them is missing from `global`.
    pub fn param_positions(&self, global: &[String]) -> Option<Vec<usize>> {
        self.all_param_names()
            .iter()
            .map(|name| global.iter().position(|g| g == name))
            .collect()
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.n_param > 0 {
            write!(f, "[{}] -> ", self.all_param_names().join(", "))?;
        }
        if self.is_map() {
            write!(f, "[{}] -> [{}]", self.n_in, self.n_dim)
        } else {
            write!(f, "[{}]", self.all_dim_names().join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_positions() {
        let space = Space::params(vec!["M".into(), "N".into()]);
        let global = vec!["N".to_string(), "K".to_string(), "M".to_string()];
        assert_eq!(space.param_positions(&global), Some(vec![2, 0]));
        assert_eq!(space.param_positions(&["N".to_string()]), None);
    }

    #[test]
    fn test_with_names() {
        let space = Space::set_with_params(2, 0).with_dim_names(vec!["i".to_string(), "j".to_string()]);
        assert_eq!(space.dim_index("j"), Some(1));
        assert_eq!(space.to_string(), "[i, j]");
    }
}
