//! Name-to-pass resolution.
//!
//! The registry is an ordinary value: build it once (usually with
//! [`PassRegistry::with_builtin_passes`]) and pass it by reference. It is
//! immutable while shared, so lookups need no synchronisation.

use crate::pass::dead_code::DeadCodeElimination;
use crate::pass::gemm_rewriter::GemmRewriter;
use crate::pass::remove_identity::RemoveIdentity;
use crate::pass::ProgramPass;
use crate::utils::errors::{CompileResult, ConfigError, ConfigErrorKind};
use std::collections::BTreeMap;

/// Creates a fresh pass instance.
pub type PassFactory = fn() -> Box<dyn ProgramPass>;

/// A static registration entry.
#[derive(Clone, Copy)]
pub struct PassEntry {
    pub name: &'static str,
    pub factory: PassFactory,
}

/// Passes shipped with the crate.
pub const BUILTIN_PASSES: &[PassEntry] = &[
    PassEntry { name: GemmRewriter::NAME, factory: new_gemm_rewriter },
    PassEntry { name: RemoveIdentity::NAME, factory: new_remove_identity },
    PassEntry { name: DeadCodeElimination::NAME, factory: new_dead_code_elimination },
];

fn new_gemm_rewriter() -> Box<dyn ProgramPass> {
    Box::new(GemmRewriter::new())
}

fn new_remove_identity() -> Box<dyn ProgramPass> {
    Box::new(RemoveIdentity::new())
}

fn new_dead_code_elimination() -> Box<dyn ProgramPass> {
    Box::new(DeadCodeElimination::new())
}

#[derive(Default)]
pub struct PassRegistry {
    factories: BTreeMap<String, PassFactory>,
}

impl PassRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_passes() -> Self {
        let mut registry = Self::new();
        for entry in BUILTIN_PASSES {
            // Builtin names are distinct.
            let _ = registry.register(entry.name, entry.factory);
        }
        registry
    }

    /// Register `factory` under `name`. Names are unique.
    pub fn register(&mut self, name: &str, factory: PassFactory) -> CompileResult<()> {
        if self.factories.contains_key(name) {
            return Err(ConfigError::new(
                ConfigErrorKind::DuplicatePass,
                format!("pass `{}` is already registered", name),
            )
            .into());
        }
        self.factories.insert(name.to_string(), factory);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate the pass registered as `name`.
    pub fn resolve(&self, name: &str) -> CompileResult<Box<dyn ProgramPass>> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory()),
            None => Err(ConfigError::new(
                ConfigErrorKind::UnknownPass,
                format!("unknown pass `{}` (registered: {})", name, self.names().join(", ")),
            )
            .into()),
        }
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for PassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassRegistry").field("passes", &self.names()).finish()
    }
}
