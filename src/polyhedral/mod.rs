//! Affine polyhedral model of stage iteration spaces.
//!
//! This module provides the exact integer arithmetic the AST builder scans:
//! - Affine expressions and constraints
//! - Integer sets (domains, contexts) and affine maps (schedules)
//! - Fourier–Motzkin projection and emptiness
//! - A reader for the isl-style text notation

pub mod space;
pub mod expr;
pub mod constraint;
pub mod set;
pub mod map;
pub mod operations;
pub mod parse;
pub mod domain;
pub mod schedule;
pub mod degenerate;

pub use space::Space;
pub use expr::{AffineExpr, Column};
pub use constraint::{Constraint, ConstraintKind, ConstraintSystem};
pub use set::IntegerSet;
pub use map::AffineMap;
pub use domain::IterationDomain;
pub use schedule::{Placement, Schedule, ScheduleGroup};
pub use degenerate::{ConstBinding, CONST_PARAM_PREFIX};
