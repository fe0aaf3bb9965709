//! Script execution boundary types
//!
//! The `ExecutionContext` is the materialized bundle handed to a sandbox
//! backend; the `ExecutionResult` is what comes back. Variable payloads on
//! the way out are sanitized: deep-cloned through JSON and stripped of
//! anything non-serializable.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use quiver_domain::{ConsoleLevel, LayeredVariables, ResponseSpec, ScriptingConfig, TestResult};

use crate::ports::CancellationReceiver;
use crate::transport::TransportRequest;

/// Variable payloads as seen by scripts: name → JSON value.
pub type VariableMap = serde_json::Map<String, serde_json::Value>;

/// Host sink for console calls: `(level, args)` in call order.
pub type ConsoleSink = Arc<dyn Fn(ConsoleLevel, Vec<serde_json::Value>) + Send + Sync>;

/// Which lifecycle phase a script runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    /// Before the request is sent; no response is available.
    PreRequest,
    /// After the response is received.
    PostResponse,
    /// The test script; runs with the response available.
    Tests,
}

impl ExecutionPhase {
    /// Whether a response snapshot accompanies this phase.
    #[must_use]
    pub const fn has_response(self) -> bool {
        matches!(self, Self::PostResponse | Self::Tests)
    }
}

/// The bundle a backend executes against.
///
/// Everything a script can observe or mutate is here; backends must not
/// reach for ambient state. Host-side handles (console sink, cancellation)
/// never cross an isolation boundary.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Transport-ready request snapshot.
    pub request: TransportRequest,
    /// Response snapshot, post-response and tests phases only.
    pub response: Option<ResponseSpec>,
    /// Environment variables, copied in from the shared store.
    pub env_vars: VariableMap,
    /// Collection variables, copied in from the shared store.
    pub collection_vars: VariableMap,
    /// Unmerged scope layers for folder/request-qualified lookups.
    pub layered_vars: LayeredVariables,
    /// Process environment snapshot.
    pub process_env: HashMap<String, String>,
    /// The collection's root directory.
    pub collection_path: PathBuf,
    /// Console sink; console calls are dropped when absent.
    pub console: Option<ConsoleSink>,
    /// Scripting configuration (whitelist, roots, filesystem gate).
    pub config: ScriptingConfig,
    /// Cooperative cancellation handle, observed at delay-resumption points.
    pub cancel: Option<CancellationReceiver>,
}

impl ExecutionContext {
    /// Creates a pre-request context with empty variable stores.
    #[must_use]
    pub fn new(request: TransportRequest, collection_path: impl Into<PathBuf>) -> Self {
        Self {
            request,
            response: None,
            env_vars: VariableMap::new(),
            collection_vars: VariableMap::new(),
            layered_vars: LayeredVariables::default(),
            process_env: HashMap::new(),
            collection_path: collection_path.into(),
            console: None,
            config: ScriptingConfig::default(),
            cancel: None,
        }
    }

    /// Attaches a response snapshot for the post-response/tests phases.
    #[must_use]
    pub fn with_response(mut self, response: ResponseSpec) -> Self {
        self.response = Some(response);
        self
    }
}

/// What a backend hands back after executing a script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    /// The (possibly mutated) request.
    pub request: TransportRequest,
    /// The (possibly mutated) response, when the phase had one.
    pub response: Option<ResponseSpec>,
    /// Sanitized environment variables.
    pub env_vars: VariableMap,
    /// Sanitized collection variables.
    pub collection_vars: VariableMap,
    /// Request name recorded via the set-next-request capability.
    pub next_request_name: Option<String>,
    /// One record per `test(...)` call, in call order.
    pub test_results: Vec<TestResult>,
}

/// Errors surfaced by the script engine port.
///
/// Every variant crossing an isolation boundary has already been reduced to
/// a message; backend-internal error objects never leak.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptExecutionError {
    /// Malformed scripting configuration.
    #[error("invalid scripting configuration: {0}")]
    Config(String),

    /// The script failed to parse.
    #[error("script failed to parse: {0}")]
    Syntax(String),

    /// The script threw at runtime.
    #[error("script failed at runtime: {0}")]
    Runtime(String),

    /// Execution exceeded the configured ceiling and the sandbox was torn
    /// down. Distinct from a thrown script error.
    #[error("script exceeded the {limit_ms}ms execution ceiling")]
    Timeout {
        /// The ceiling that was exceeded.
        limit_ms: u64,
    },

    /// The backend could not be initialized.
    #[error("sandbox setup failed: {0}")]
    SandboxSetup(String),

    /// Execution was cancelled before completion.
    #[error("script execution cancelled")]
    Cancelled,
}

/// Deep-clones a variable map through JSON, dropping non-serializable
/// entries. The backend-facing equivalent of a defensive `clean_json`.
#[must_use]
pub fn sanitize_variables(vars: &VariableMap) -> VariableMap {
    vars.iter()
        .filter_map(|(name, value)| {
            serde_json::to_string(value)
                .ok()
                .and_then(|s| serde_json::from_str(&s).ok())
                .map(|clean: serde_json::Value| (name.clone(), clean))
        })
        .collect()
}
