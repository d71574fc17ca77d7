//! Iteration domains of compute stages.

use crate::polyhedral::parse::parse_set;
use crate::polyhedral::set::IntegerSet;
use crate::utils::errors::{CompileResult, ConfigError, ConfigErrorKind};
use std::fmt;

/// The exact set of loop-index tuples one stage executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationDomain {
    pub name: String,
    pub set: IntegerSet,
}

impl IterationDomain {
    pub fn new(name: impl Into<String>, set: IntegerSet) -> Self {
        Self { name: name.into(), set }
    }

    /// Parse `[N] -> { S[i, j] : ... }`. The tuple name becomes the stage name.
    pub fn parse(text: &str) -> CompileResult<Self> {
        let parsed = parse_set(text)?;
        let name = parsed.name.ok_or_else(|| {
            ConfigError::new(ConfigErrorKind::Parse, format!("iteration domain has no stage name: {}", text))
        })?;
        Ok(Self { name, set: parsed.set })
    }

    pub fn n_dim(&self) -> usize {
        self.set.dim()
    }

    pub fn axis_names(&self) -> Vec<String> {
        self.set.dim_names()
    }

    pub fn param_names(&self) -> Vec<String> {
        self.set.param_names()
    }
}

impl fmt::Display for IterationDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.set)
    }
}
