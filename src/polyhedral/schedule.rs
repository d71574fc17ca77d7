//! Schedules and schedule groups.
//!
//! A schedule maps each point of a stage's iteration domain to a
//! timestamp; stages whose timestamps share a leading prefix may share
//! the loops that scan that prefix.

use crate::polyhedral::domain::IterationDomain;
use crate::polyhedral::expr::{AffineExpr, Column};
use crate::polyhedral::map::AffineMap;
use crate::polyhedral::parse::parse_map;
use crate::utils::errors::{CompileResult, ConfigError, ConfigErrorKind};
use std::fmt;

/// How one timestamp level depends on the domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Parameters and constants only.
    Scalar(AffineExpr),
    /// `axis + offset`, with `offset` over parameters and constants.
    Axis { axis: usize, offset: AffineExpr },
}

/// The schedule of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub stage: String,
    pub map: AffineMap,
}

impl Schedule {
    pub fn new(stage: impl Into<String>, map: AffineMap) -> Self {
        Self { stage: stage.into(), map }
    }

    /// `S[i, j] -> [i, j]`
    pub fn identity(domain: &IterationDomain) -> Self {
        let map = AffineMap::identity(domain.n_dim(), domain.set.n_param())
            .with_names(domain.axis_names(), domain.param_names());
        Self::new(domain.name.clone(), map)
    }

    /// Parse `[N] -> { S[i, j] -> [0, i, j] }`.
    pub fn parse(text: &str) -> CompileResult<Self> {
        let parsed = parse_map(text)?;
        let stage = parsed.name.ok_or_else(|| {
            ConfigError::new(ConfigErrorKind::Parse, format!("schedule has no stage name: {}", text))
        })?;
        Ok(Self::new(stage, parsed.map))
    }

    pub fn n_in(&self) -> usize {
        self.map.n_in()
    }

    /// Number of timestamp levels.
    pub fn n_out(&self) -> usize {
        self.map.n_out()
    }

    /// Classify every output. Outputs that are not a unit-coefficient
    /// placement of one axis, and axes that are never placed, are rejected.
    pub fn placements(&self) -> CompileResult<Vec<Placement>> {
        let unsupported = |msg: String| ConfigError::new(ConfigErrorKind::UnsupportedSchedule, msg);
        let mut placed = vec![false; self.n_in()];
        let mut result = Vec::with_capacity(self.n_out());
        for (level, out) in self.map.outputs.iter().enumerate() {
            let dims = out.dims_used();
            match dims.as_slice() {
                [] => result.push(Placement::Scalar(out.clone())),
                [axis] if out.coeff(*axis) == 1 => {
                    let mut offset = out.clone();
                    offset.set_col(Column::Dim(*axis), 0);
                    placed[*axis] = true;
                    result.push(Placement::Axis { axis: *axis, offset });
                }
                _ => {
                    return Err(unsupported(format!(
                        "stage `{}`: timestamp level {} is `{}`, expected one axis with coefficient 1",
                        self.stage,
                        level,
                        out.to_string_with_names(&self.map.space.all_dim_names(), &self.map.param_names())
                    ))
                    .into());
                }
            }
        }
        if let Some(axis) = placed.iter().position(|p| !p) {
            return Err(unsupported(format!(
                "stage `{}`: axis `{}` does not appear in its schedule",
                self.stage,
                self.map.space.all_dim_names()[axis]
            ))
            .into());
        }
        Ok(result)
    }

    /// Pad with constant `0` levels up to `n_out` levels.
    pub fn pad_to(&mut self, n_out: usize) {
        while self.map.n_out() < n_out {
            self.map.push_constant(0);
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.map)
    }
}

/// Stages whose timestamps are ordered together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleGroup {
    pub schedules: Vec<Schedule>,
}

impl ScheduleGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, schedule: Schedule) {
        self.schedules.push(schedule);
    }

    pub fn with(mut self, schedule: Schedule) -> Self {
        self.push(schedule);
        self
    }

    pub fn get(&self, stage: &str) -> Option<&Schedule> {
        self.schedules.iter().find(|s| s.stage == stage)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Schedule> {
        self.schedules.iter()
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }

    /// Stage `k` runs entirely before stage `k + 1`: `S_k[x] -> [k, x]`.
    pub fn sequential(domains: &[IterationDomain]) -> Self {
        let mut group = Self::new();
        for (k, domain) in domains.iter().enumerate() {
            let n_dim = domain.n_dim();
            let n_param = domain.set.n_param();
            let mut outputs = vec![AffineExpr::constant(k as i64, n_dim, n_param)];
            outputs.extend((0..n_dim).map(|d| AffineExpr::var(d, n_dim, n_param)));
            let map = AffineMap::from_outputs(n_dim, n_param, outputs)
                .with_names(domain.axis_names(), domain.param_names());
            group.push(Schedule::new(domain.name.clone(), map));
        }
        group
    }

    /// Stages share loops axis by axis and are interleaved innermost:
    /// `S_k[x] -> [x, 0..., k]`.
    pub fn fused(domains: &[IterationDomain]) -> Self {
        let depth = domains.iter().map(IterationDomain::n_dim).max().unwrap_or(0);
        let mut group = Self::new();
        for (k, domain) in domains.iter().enumerate() {
            let n_dim = domain.n_dim();
            let n_param = domain.set.n_param();
            let mut outputs: Vec<AffineExpr> = (0..n_dim).map(|d| AffineExpr::var(d, n_dim, n_param)).collect();
            outputs.extend((n_dim..depth).map(|_| AffineExpr::zero(n_dim, n_param)));
            outputs.push(AffineExpr::constant(k as i64, n_dim, n_param));
            let map = AffineMap::from_outputs(n_dim, n_param, outputs)
                .with_names(domain.axis_names(), domain.param_names());
            group.push(Schedule::new(domain.name.clone(), map));
        }
        group
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placements() {
        let s = Schedule::parse("[N] -> { S[i, j] -> [0, j + N, i, 2] }").unwrap();
        let p = s.placements().unwrap();
        assert_eq!(p.len(), 4);
        assert!(matches!(p[0], Placement::Scalar(ref e) if e.as_constant() == Some(0)));
        match &p[1] {
            Placement::Axis { axis, offset } => {
                assert_eq!(*axis, 1);
                assert_eq!(offset.param_coeffs, vec![1]);
            }
            other => panic!("unexpected placement {:?}", other),
        }
        assert!(matches!(p[2], Placement::Axis { axis: 0, .. }));
    }

    #[test]
    fn test_unsupported_schedules() {
        for text in ["{ S[i, j] -> [i + j] }", "{ S[i] -> [2i] }", "{ S[i, j] -> [i] }"] {
            let err = Schedule::parse(text).unwrap().placements().unwrap_err();
            assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnsupportedSchedule), "{}", text);
        }
    }

    #[test]
    fn test_group_constructors() {
        let a = IterationDomain::parse("{ A[i, j] : 0 <= i < 2 and 0 <= j < 2 }").unwrap();
        let b = IterationDomain::parse("{ B[i] : 0 <= i < 2 }").unwrap();
        let seq = ScheduleGroup::sequential(&[a.clone(), b.clone()]);
        assert_eq!(seq.get("B").unwrap().map.apply(&[1], &[]), vec![1, 1]);

        let fused = ScheduleGroup::fused(&[a, b]);
        assert_eq!(fused.get("A").unwrap().map.apply(&[1, 0], &[]), vec![1, 0, 0]);
        assert_eq!(fused.get("B").unwrap().map.apply(&[1], &[]), vec![1, 0, 1]);
        assert!(fused.get("C").is_none());
    }

    #[test]
    fn test_pad() {
        let mut s = Schedule::parse("{ S[i] -> [i] }").unwrap();
        s.pad_to(3);
        assert_eq!(s.map.apply(&[4], &[]), vec![4, 0, 0]);
    }
}
