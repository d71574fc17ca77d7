//! Error types for the compiler core.
//!
//! Errors are grouped by how the caller is expected to react: configuration
//! errors abort compilation of one program or lowering request, invariant
//! violations mean a pass produced something that must never be committed.

use thiserror::Error;
use std::fmt;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum CompileError {
    /// Bad input or bad usage
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A rewrite broke a structural invariant
    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantError),

    /// Typed attribute access failed
    #[error("Attribute error: {0}")]
    Attr(#[from] AttrError),

    /// Evaluating a generated expression failed
    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    /// The configuration error kind, if this is one.
    pub fn config_kind(&self) -> Option<ConfigErrorKind> {
        match self {
            CompileError::Config(e) => Some(e.kind),
            _ => None,
        }
    }

    /// The invariant kind, if this is one.
    pub fn invariant_kind(&self) -> Option<InvariantKind> {
        match self {
            CompileError::Invariant(e) => Some(e.kind),
            _ => None,
        }
    }
}

/// Result alias used across the crate.
pub type CompileResult<T> = Result<T, CompileError>;

/// Reported to the caller; compilation for the affected program aborts.
#[derive(Error, Debug, Clone)]
pub struct ConfigError {
    /// The error message
    pub message: String,
    /// The kind of configuration error
    pub kind: ConfigErrorKind,
}

impl ConfigError {
    /// Create a new configuration error.
    pub fn new(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// No pass registered under the requested name
    UnknownPass,
    /// A pass name was registered twice
    DuplicatePass,
    /// A fetch id does not name any instruction output
    UnknownFetch,
    /// A variable id was referenced before being declared
    UnknownVariable,
    /// A variable id was declared twice
    DuplicateVariable,
    /// A pattern was matched against an instruction of the wrong arity
    Arity,
    /// Domain and schedule disagree on dimensionality
    DimensionMismatch,
    /// Stage name not known to the builder
    UnknownStage,
    /// Two domains share a stage name
    DuplicateStage,
    /// A stage has a domain but no schedule, or the reverse
    MissingSchedule,
    /// Schedule is not a unit-coefficient placement
    UnsupportedSchedule,
    /// A loop level has no lower bound
    UnboundedLoop,
    /// Build option text could not be understood
    InvalidOption,
    /// Set or map text could not be parsed
    Parse,
    /// A constant or coefficient is outside the supported range
    Overflow,
    /// Setter called after `build()`
    AlreadyBuilt,
    /// Accessor called before `build()`
    NotBuilt,
}

/// A structural invariant was broken by a pass. Fatal.
#[derive(Error, Debug, Clone)]
pub struct InvariantError {
    /// The error message
    pub message: String,
    /// The kind of violation
    pub kind: InvariantKind,
    /// The pass that produced the broken program
    pub pass: String,
}

impl InvariantError {
    /// Create a new invariant violation attributed to `pass`.
    pub fn new(kind: InvariantKind, pass: impl Into<String>, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind, pass: pass.into() }
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after pass `{}`", self.message, self.pass)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantKind {
    /// An input refers to a variable nothing produces
    DanglingReference,
    /// A fetch id is no longer produced by any instruction
    FetchRemoved,
    /// Operand count contradicts the op signature
    ArityMismatch,
    /// An input is produced by a later instruction
    Topology,
    /// A variable id is produced more than once
    SsaViolation,
}

/// Typed attribute access failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttrError {
    /// Attribute is required but absent
    #[error("missing attribute `{name}`")]
    Missing {
        /// Attribute name
        name: String,
    },
    /// Attribute exists with another type
    #[error("attribute `{name}` is {found}, expected {expected}")]
    TypeMismatch {
        /// Attribute name
        name: String,
        /// Requested type
        expected: &'static str,
        /// Stored type
        found: &'static str,
    },
}

/// Evaluating an expression failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// A variable had no binding
    #[error("unbound variable `{0}`")]
    Unbound(String),
    /// Division or modulo by zero
    #[error("division by zero")]
    DivisionByZero,
    /// A loop without an upper bound was executed
    #[error("cannot execute unbounded loop over `{0}`")]
    Unbounded(String),
    /// An intermediate value does not fit in `i64`
    #[error("integer overflow")]
    Overflow,
    /// Expression has no integer value
    #[error("`{0}` is not an integer expression")]
    NotInteger(String),
}
