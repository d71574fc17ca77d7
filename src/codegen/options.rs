//! Per-level scanning directives.
//!
//! The textual form follows isl's AST build options:
//! `{ unroll[1]; separate[0] }`, optionally with a `[...] ->` prefix on
//! each item (`{ [i0, i1] -> unroll[1] }`).

use crate::utils::errors::{ConfigError, ConfigErrorKind};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How the loop of one timestamp level is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoopKind {
    /// One loop over the union of all stages' bounds
    #[default]
    Atomic,
    /// One loop per range with a distinct set of stages
    Separate,
    /// Fully unrolled when the extent is a small constant
    Unroll,
}

impl LoopKind {
    pub fn name(self) -> &'static str {
        match self {
            LoopKind::Atomic => "atomic",
            LoopKind::Separate => "separate",
            LoopKind::Unroll => "unroll",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    levels: BTreeMap<usize, LoopKind>,
}

impl BuildOptions {
    /// Largest extent `unroll` expands.
    pub const MAX_UNROLL: i64 = 64;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let invalid = |msg: String| ConfigError::new(ConfigErrorKind::InvalidOption, msg);
        let body = text.trim();
        let body = body
            .strip_prefix('{')
            .and_then(|b| b.strip_suffix('}'))
            .unwrap_or(body);

        let mut options = Self::new();
        for item in body.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let directive = item.rsplit("->").next().unwrap_or(item).trim();
            let (name, rest) = directive
                .split_once('[')
                .ok_or_else(|| invalid(format!("expected `name[level]`, found `{}`", item)))?;
            let level = rest
                .strip_suffix(']')
                .and_then(|l| l.trim().parse::<usize>().ok())
                .ok_or_else(|| invalid(format!("invalid level in `{}`", item)))?;
            let kind = match name.trim() {
                "atomic" => LoopKind::Atomic,
                "separate" => LoopKind::Separate,
                "unroll" => LoopKind::Unroll,
                other => return Err(invalid(format!("unknown build option `{}`", other))),
            };
            options.levels.insert(level, kind);
        }
        Ok(options)
    }

    pub fn set(&mut self, level: usize, kind: LoopKind) {
        self.levels.insert(level, kind);
    }

    pub fn unroll(mut self, level: usize) -> Self {
        self.set(level, LoopKind::Unroll);
        self
    }

    pub fn separate(mut self, level: usize) -> Self {
        self.set(level, LoopKind::Separate);
        self
    }

    pub fn atomic(mut self, level: usize) -> Self {
        self.set(level, LoopKind::Atomic);
        self
    }

    pub fn kind(&self, level: usize) -> LoopKind {
        self.levels.get(&level).copied().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

impl FromStr for BuildOptions {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BuildOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self
            .levels
            .iter()
            .map(|(level, kind)| format!("{}[{}]", kind.name(), level))
            .collect();
        write!(f, "{{ {} }}", items.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let opts = BuildOptions::parse("{ unroll[1]; [i0, i1] -> separate[0] }").unwrap();
        assert_eq!(opts.kind(0), LoopKind::Separate);
        assert_eq!(opts.kind(1), LoopKind::Unroll);
        assert_eq!(opts.kind(2), LoopKind::Atomic);
        assert_eq!(opts.to_string(), "{ separate[0]; unroll[1] }");
        assert_eq!(opts, BuildOptions::new().unroll(1).separate(0));
        assert!(BuildOptions::parse("{ }").unwrap().is_empty());
    }

    #[test]
    fn test_invalid() {
        for text in ["{ vectorize[0] }", "{ unroll }", "{ unroll[x] }", "{ unroll[-1] }"] {
            let err = BuildOptions::parse(text).unwrap_err();
            assert_eq!(err.kind, ConfigErrorKind::InvalidOption, "{}", text);
        }
    }
}
