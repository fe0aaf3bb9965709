//! Unrestricted backend
//!
//! Shares process memory with the host and runs without engine limits.
//! Filesystem and module access stay confined to the collection directory
//! plus the configured extra roots, with raw filesystem access further gated
//! by the filesystem-access flag. Cancellation is cooperative, observed at
//! delay-resumption points.

use async_trait::async_trait;

use quiver_application::engine::ScriptExecutionError;

use super::{BackendJob, BackendOutcome, IsolationBackend, run_in_process, spawn_cancel_watcher};
use crate::scripting::engine::{EngineLimits, InterruptFlag};

/// The memory-sharing backend.
#[derive(Debug, Default)]
pub struct UnrestrictedBackend;

impl UnrestrictedBackend {
    /// Creates the backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl IsolationBackend for UnrestrictedBackend {
    async fn execute(&self, job: BackendJob) -> Result<BackendOutcome, ScriptExecutionError> {
        let interrupt = InterruptFlag::new();
        let watcher = spawn_cancel_watcher(&job.context, &interrupt);

        let flag = interrupt.clone();
        let result = tokio::task::spawn_blocking(move || {
            run_in_process(&job, EngineLimits::default(), true, &flag)
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
