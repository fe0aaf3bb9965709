//! Portable backend
//!
//! The in-process interpreter fallback used when native isolation is
//! unavailable: no separate memory space, but a constrained module surface
//! (never the filesystem), engine safety limits, and the synthetic
//! cooperative timer queue for `set_timeout` scheduling.

use async_trait::async_trait;

use quiver_application::engine::ScriptExecutionError;

use super::{BackendJob, BackendOutcome, IsolationBackend, run_in_process, spawn_cancel_watcher};
use crate::scripting::engine::{EngineLimits, InterruptFlag};
use crate::scripting::modules::ModuleKind;

/// The dependency-free fallback backend.
#[derive(Debug, Default)]
pub struct PortableBackend;

impl PortableBackend {
    /// Creates the backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl IsolationBackend for PortableBackend {
    async fn execute(&self, mut job: BackendJob) -> Result<BackendOutcome, ScriptExecutionError> {
        job.modules.retain(|kind| *kind != ModuleKind::Fs);

        let interrupt = InterruptFlag::new();
        let watcher = spawn_cancel_watcher(&job.context, &interrupt);

        let flag = interrupt.clone();
        let result = tokio::task::spawn_blocking(move || {
            run_in_process(&job, EngineLimits::constrained(), false, &flag)
        })
        .await;

        if let Some(watcher) = watcher {
            watcher.abort();
        }

        result.map_err(|join_error| {
            ScriptExecutionError::SandboxSetup(format!("execution task failed: {join_error}"))
        })?
    }
}
