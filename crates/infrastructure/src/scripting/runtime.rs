//! Script runtime dispatcher
//!
//! Selects a backend by configured sandbox mode, prepares the invocation
//! (module table, allowed roots), executes, and sanitizes the outputs. The
//! restricted short-circuit takes precedence over every other configuration:
//! nothing else is even evaluated.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use quiver_application::engine::{
    ExecutionContext, ExecutionPhase, ExecutionResult, ScriptExecutionError, sanitize_variables,
};
use quiver_application::ports::ScriptEngine;
use quiver_domain::{ConsoleLevel, SandboxMode};

use super::backend::{
    BackendJob, IsolatedBackend, IsolationBackend, PortableBackend, UnrestrictedBackend,
};
use super::modules::resolve_modules;

/// Default execution ceiling for the isolated backend.
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Per-invocation progress, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvocationState {
    Idle,
    Preparing,
    Executing,
    Finalizing,
    Failed,
    Done,
}

fn transition(from: InvocationState, to: InvocationState) -> InvocationState {
    debug!(?from, ?to, "script invocation state");
    to
}

/// The dispatcher over the three isolation backends.
pub struct ScriptRuntime {
    mode: SandboxMode,
    timeout_ms: u64,
    unrestricted: UnrestrictedBackend,
    isolated: IsolatedBackend,
    portable: PortableBackend,
}

impl ScriptRuntime {
    /// Creates a dispatcher for the given mode.
    #[must_use]
    pub fn new(mode: SandboxMode) -> Self {
        Self {
            mode,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            unrestricted: UnrestrictedBackend::new(),
            isolated: IsolatedBackend::new(),
            portable: PortableBackend::new(),
        }
    }

    /// Overrides the isolated backend's execution ceiling.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// The configured sandbox mode.
    #[must_use]
    pub const fn mode(&self) -> SandboxMode {
        self.mode
    }

    /// Disposes pooled backend resources. Safe to call more than once.
    pub fn dispose(&self) {
        self.isolated.dispose();
    }

    fn restricted_result(context: ExecutionContext) -> ExecutionResult {
        ExecutionResult {
            request: context.request,
            response: context.response,
            env_vars: sanitize_variables(&context.env_vars),
            collection_vars: sanitize_variables(&context.collection_vars),
            next_request_name: None,
            test_results: Vec::new(),
        }
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn allowed_roots(collection_path: &Path, additional: &[String]) -> Vec<PathBuf> {
    let mut roots = vec![collection_path.to_path_buf()];
    for root in additional {
        let path = Path::new(root);
        if path.is_absolute() {
            roots.push(path.to_path_buf());
        } else {
            roots.push(collection_path.join(path));
        }
    }
    roots
}

#[async_trait]
impl ScriptEngine for ScriptRuntime {
    async fn run(
        &self,
        phase: ExecutionPhase,
        script: &str,
        context: ExecutionContext,
    ) -> Result<ExecutionResult, ScriptExecutionError> {
        let mut state = InvocationState::Idle;

        // Restricted wins unconditionally; no other setting is evaluated.
        if self.mode == SandboxMode::Restricted {
            debug!(?phase, "restricted mode; script not executed");
            return Ok(Self::restricted_result(context));
        }

        state = transition(state, InvocationState::Preparing);
        let modules = resolve_modules(
            &context.config.module_whitelist,
            context.config.filesystem_access.allow,
        );
        let roots = allowed_roots(
            &context.collection_path,
            &context.config.additional_context_roots,
        );
        let console = context.console.clone();

        let job = BackendJob {
            script: script.to_string(),
            context,
            modules,
            allowed_roots: roots,
            filesystem_allowed: false,
            timeout_ms: self.timeout_ms,
        };

        state = transition(state, InvocationState::Executing);
        let executed = match self.mode {
            SandboxMode::Restricted => unreachable!("restricted short-circuits above"),
            SandboxMode::Unrestricted => {
                let mut job = job;
                job.filesystem_allowed = job.context.config.filesystem_access.allow;
                self.unrestricted.execute(job).await
            }
            SandboxMode::Isolated => match self.isolated.execute(job.clone()).await {
                Err(ScriptExecutionError::SandboxSetup(message)) => {
                    warn!(%message, "isolated backend unavailable; falling back to portable");
                    self.portable.execute(job).await
                }
                other => other,
            },
        };

        let outcome = match executed {
            Ok(outcome) => outcome,
            Err(error) => {
                state = transition(state, InvocationState::Failed);
                let _ = transition(state, InvocationState::Finalizing);
                return Err(error);
            }
        };

        state = transition(state, InvocationState::Finalizing);
        if let Some(message) = &outcome.runtime_error {
            // Partial mutations stand; the failure is surfaced through the
            // console sink rather than an error return.
            if let Some(sink) = &console {
                (sink.as_ref())(
                    ConsoleLevel::Error,
                    vec![serde_json::Value::String(message.clone())],
                );
            }
            warn!(?phase, error = %message, "script threw at runtime");
        }

        let result = ExecutionResult {
            request: outcome.state.request,
            response: outcome.state.response,
            env_vars: sanitize_variables(&outcome.state.env_vars),
            collection_vars: sanitize_variables(&outcome.state.collection_vars),
            next_request_name: outcome.state.next_request_name,
            test_results: outcome.state.test_results,
        };
        let _ = transition(state, InvocationState::Done);
        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quiver_application::engine::VariableMap;
    use quiver_application::transport::TransportRequest;

    fn context() -> ExecutionContext {
        let mut request = TransportRequest::default();
        request.method = "GET".to_string();
        request.url = "https://api.example.com".to_string();
        ExecutionContext::new(request, "/tmp/collection")
    }

    #[tokio::test]
    async fn test_restricted_returns_inputs_unchanged() {
        let runtime = ScriptRuntime::new(SandboxMode::Restricted);
        let mut ctx = context();
        ctx.env_vars = VariableMap::from_iter([("a".to_string(), serde_json::json!(1))]);

        // Even a syntactically invalid script must not error.
        let result = runtime
            .run(ExecutionPhase::PreRequest, "this is (((not a script", ctx.clone())
            .await
            .unwrap();

        assert_eq!(result.request, ctx.request);
        assert_eq!(result.next_request_name, None);
        assert_eq!(result.env_vars, ctx.env_vars);
        assert!(result.test_results.is_empty());
    }

    #[tokio::test]
    async fn test_unrestricted_executes_script() {
        let runtime = ScriptRuntime::new(SandboxMode::Unrestricted);
        let result = runtime
            .run(
                ExecutionPhase::PreRequest,
                r#"qv.set_env_var("who", "script");"#,
                context(),
            )
            .await
            .unwrap();

        assert_eq!(result.env_vars.get("who").unwrap(), &serde_json::json!("script"));
    }

    #[tokio::test]
    async fn test_syntax_error_is_reported() {
        let runtime = ScriptRuntime::new(SandboxMode::Unrestricted);
        let result = runtime
            .run(ExecutionPhase::PreRequest, "let = ;;;", context())
            .await;

        assert!(matches!(result, Err(ScriptExecutionError::Syntax(_))));
    }

    #[tokio::test]
    async fn test_runtime_error_returns_partial_state() {
        let runtime = ScriptRuntime::new(SandboxMode::Unrestricted);
        let result = runtime
            .run(
                ExecutionPhase::PreRequest,
                r#"
                    qv.set_env_var("before", true);
                    throw "boom";
                "#,
                context(),
            )
            .await
            .unwrap();

        assert_eq!(result.env_vars.get("before").unwrap(), &serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_isolated_executes_with_marshalling() {
        let runtime = ScriptRuntime::new(SandboxMode::Isolated);
        let result = runtime
            .run(
                ExecutionPhase::PreRequest,
                r#"
                    let url = req.get_url();
                    qv.set_env_var("seen_url", url);
                "#,
                context(),
            )
            .await
            .unwrap();

        assert_eq!(
            result.env_vars.get("seen_url").unwrap(),
            &serde_json::json!("https://api.example.com")
        );
        runtime.dispose();
    }

    #[tokio::test]
    async fn test_isolated_timeout_is_distinct() {
        let runtime = ScriptRuntime::new(SandboxMode::Isolated).with_timeout_ms(200);
        let result = runtime
            .run(ExecutionPhase::PreRequest, "sleep(10000);", context())
            .await;

        assert!(matches!(
            result,
            Err(ScriptExecutionError::Timeout { limit_ms: 200 })
        ));
        runtime.dispose();
    }

    #[tokio::test]
    async fn test_isolated_pool_reset_between_invocations() {
        let runtime = ScriptRuntime::new(SandboxMode::Isolated);

        runtime
            .run(
                ExecutionPhase::PreRequest,
                "let leaked = \"secret\";",
                context(),
            )
            .await
            .unwrap();

        // A fresh invocation must not see the previous one's bindings; the
        // unknown variable is a runtime error, which surfaces as a partial
        // (empty) result rather than a leaked value.
        let result = runtime
            .run(
                ExecutionPhase::PreRequest,
                r#"qv.set_env_var("stolen", leaked);"#,
                context(),
            )
            .await
            .unwrap();

        assert!(result.env_vars.get("stolen").is_none());
        runtime.dispose();
    }
}
