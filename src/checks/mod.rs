//! Check implementations and their registry
//!
//! A case names the check that decides its outcome. The registry maps those
//! ids to [`Check`] trait objects; it is built once per run and shared by
//! every worker, so checks must be callable from any thread.

mod builtin;
mod context;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::process::ExecError;
use crate::runner::TaskDescriptor;

pub use builtin::{CommandCheck, FileExistsCheck, OutputMatchesCheck};
pub use context::CheckContext;

/// Failure of one check body
#[derive(Error, Debug)]
pub enum CheckError {
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("{0}")]
    Assertion(String),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Decides the outcome of one case
pub trait Check: Send + Sync {
    /// Run the case; `Ok(())` is a pass
    fn execute(&self, case: &TaskDescriptor, ctx: &CheckContext<'_>) -> Result<(), CheckError>;

    /// Reject a case whose fields this check cannot use, before the run starts
    fn validate(&self, _case: &TaskDescriptor) -> Result<(), String> {
        Ok(())
    }
}

/// Adapts a closure into a [`Check`]
pub struct FnCheck<F>(pub F);

impl<F> Check for FnCheck<F>
where
    F: Fn(&TaskDescriptor, &CheckContext<'_>) -> Result<(), CheckError> + Send + Sync,
{
    fn execute(&self, case: &TaskDescriptor, ctx: &CheckContext<'_>) -> Result<(), CheckError> {
        (self.0)(case, ctx)
    }
}

#[derive(Clone, Default)]
pub struct CheckRegistry {
    checks: HashMap<String, Arc<dyn Check>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `command`, `output_matches` and `file_exists`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("command", CommandCheck);
        registry.register("output_matches", OutputMatchesCheck);
        registry.register("file_exists", FileExistsCheck);
        registry
    }

    /// Register `check` under `id`, replacing any previous entry
    pub fn register<C>(&mut self, id: impl Into<String>, check: C) -> &mut Self
    where
        C: Check + 'static,
    {
        self.checks.insert(id.into(), Arc::new(check));
        self
    }

    pub fn register_fn<F>(&mut self, id: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&TaskDescriptor, &CheckContext<'_>) -> Result<(), CheckError> + Send + Sync + 'static,
    {
        self.register(id, FnCheck(f))
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Check>> {
        self.checks.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.checks.contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.checks.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl std::fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckRegistry")
            .field("checks", &self.ids())
            .finish()
    }
}
