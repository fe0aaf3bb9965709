//! Script engine port

use async_trait::async_trait;

use crate::engine::{ExecutionContext, ExecutionPhase, ExecutionResult, ScriptExecutionError};

/// Port for running author-supplied scripts against an execution context.
///
/// Implementations select an isolation backend and guarantee the same
/// capability surface regardless of which one runs the script.
#[async_trait]
pub trait ScriptEngine: Send + Sync {
    /// Runs `script` in the given phase against `context`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptExecutionError::Syntax`] when the script fails to
    /// parse, [`ScriptExecutionError::Timeout`] when it exceeds the
    /// execution ceiling, and [`ScriptExecutionError::SandboxSetup`] when
    /// the backend cannot be initialized. Runtime throws are caught by the
    /// implementation: partial mutations are still returned and the error is
    /// surfaced through the console sink or a failed test result.
    async fn run(
        &self,
        phase: ExecutionPhase,
        script: &str,
        context: ExecutionContext,
    ) -> Result<ExecutionResult, ScriptExecutionError>;
}
