//! Sequential pass application.

use crate::graph::Program;
use crate::pass::{verify, DefUse, PassContext, PassRegistry, Target};
use crate::utils::errors::{CompileResult, ConfigError, ConfigErrorKind};
use log::{debug, info, trace};
use std::collections::HashSet;

/// Runs named passes over a program, one verified commit per pass.
#[derive(Debug, Clone, Copy)]
pub struct PassManager<'r> {
    registry: &'r PassRegistry,
}

impl<'r> PassManager<'r> {
    pub fn new(registry: &'r PassRegistry) -> Self {
        Self { registry }
    }

    /// Apply `pass_names` in order.
    ///
    /// Every name is resolved before any pass runs. Each pass result is
    /// relinked and verified before it replaces `program`; if a pass fails,
    /// `program` keeps the state left by the last successful pass.
    pub fn apply<S: AsRef<str>>(
        &self,
        program: &mut Program,
        fetch_ids: &HashSet<String>,
        target: &Target,
        pass_names: &[S],
    ) -> CompileResult<()> {
        let passes = pass_names
            .iter()
            .map(|name| self.registry.resolve(name.as_ref()))
            .collect::<CompileResult<Vec<_>>>()?;

        let mut unknown: Vec<&str> = fetch_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !program.produces(id))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(ConfigError::new(
                ConfigErrorKind::UnknownFetch,
                format!("fetch id(s) {} are not produced by any instruction", unknown.join(", ")),
            )
            .into());
        }

        for pass in &passes {
            if !pass.applies_to(target) {
                debug!("skipping `{}`: not applicable to target {}", pass.name(), target);
                continue;
            }
            let def_use = DefUse::build(program);
            let ctx = PassContext { fetch_ids, target, def_use: &def_use };
            let before = program.len();
            let mut next = pass.run(program, &ctx)?.finish();
            verify(&next, fetch_ids, pass.name())?;
            next.compact();
            info!("`{}`: {} -> {} instruction(s)", pass.name(), before, next.len());
            trace!("after `{}`:\n{}", pass.name(), next);
            *program = next;
        }
        Ok(())
    }
}
