//! Isolation backends
//!
//! Three interchangeable strategies behind one trait: unrestricted (shares
//! process memory, filesystem gated to allowed roots), isolated (separate
//! memory space on a pooled worker, marshalled capability calls, hard
//! execution ceiling), and portable (in-process interpreter with constrained
//! limits, the fallback when isolation cannot be set up).

mod isolated;
mod portable;
mod unrestricted;

pub use isolated::IsolatedBackend;
pub use portable::PortableBackend;
pub use unrestricted::UnrestrictedBackend;

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::Value;

use quiver_application::engine::{ConsoleSink, ExecutionContext, ScriptExecutionError};

use super::bridge::{CapabilityCall, ScriptState, dispatch};
use super::engine::{
    CapabilityHost, EngineLimits, EngineSetup, InterruptFlag, RunEnd, build_engine, run_script,
};
use super::fs_guard::PathGuard;
use super::modules::{ModuleKind, register_modules};

/// One prepared invocation, ready for a backend.
#[derive(Clone)]
pub struct BackendJob {
    /// The joined script source.
    pub script: String,
    /// The execution context.
    pub context: ExecutionContext,
    /// Resolved module table.
    pub modules: Vec<ModuleKind>,
    /// Allowed filesystem roots (collection directory first).
    pub allowed_roots: Vec<PathBuf>,
    /// Whether raw filesystem access is allowed at all.
    pub filesystem_allowed: bool,
    /// Execution ceiling for backends that enforce one.
    pub timeout_ms: u64,
}

/// What a backend produced. A runtime throw still carries the partial state;
/// the dispatcher surfaces the error and returns the mutations.
pub struct BackendOutcome {
    /// The invocation state after the script ran.
    pub state: ScriptState,
    /// The runtime error message, when the script threw.
    pub runtime_error: Option<String>,
}

/// Strategy interface over the three backends.
#[async_trait]
pub trait IsolationBackend: Send + Sync {
    /// Executes the job.
    ///
    /// # Errors
    ///
    /// Syntax, timeout, cancellation, and setup failures are errors; runtime
    /// throws are not — they come back inside the outcome.
    async fn execute(&self, job: BackendJob) -> Result<BackendOutcome, ScriptExecutionError>;
}

/// In-process capability host: dispatches straight against the shared state.
struct LocalHost {
    state: Rc<RefCell<ScriptState>>,
    console: Option<ConsoleSink>,
}

impl CapabilityHost for LocalHost {
    fn invoke(&self, call: CapabilityCall) -> Result<Value, String> {
        dispatch(&mut self.state.borrow_mut(), self.console.as_ref(), &call)
    }
}

/// Runs a job on the current thread with the given limits. Shared by the
/// unrestricted and portable backends; the isolated worker has its own loop.
pub(crate) fn run_in_process(
    job: &BackendJob,
    limits: EngineLimits,
    enable_fs: bool,
    interrupt: &InterruptFlag,
) -> Result<BackendOutcome, ScriptExecutionError> {
    let state = Rc::new(RefCell::new(ScriptState::from_context(&job.context)));
    let host: Rc<dyn CapabilityHost> = Rc::new(LocalHost {
        state: Rc::clone(&state),
        console: job.context.console.clone(),
    });

    let setup = EngineSetup {
        host,
        has_response: job.context.response.is_some(),
        limits,
        interrupt: interrupt.clone(),
    };
    let (mut engine, timers, mut scope) = build_engine(&setup);

    let guard = (enable_fs && job.filesystem_allowed)
        .then(|| PathGuard::new(job.allowed_roots.clone()));
    register_modules(&mut engine, &job.modules, guard.as_ref());

    let end = run_script(&engine, &mut scope, &timers, interrupt, &job.script);
    let final_state = state.borrow().clone();

    match end {
        RunEnd::Completed => Ok(BackendOutcome {
            state: final_state,
            runtime_error: None,
        }),
        RunEnd::Runtime(message) => Ok(BackendOutcome {
            state: final_state,
            runtime_error: Some(message),
        }),
        RunEnd::Syntax(message) => Err(ScriptExecutionError::Syntax(message)),
        RunEnd::Interrupted => Err(ScriptExecutionError::Cancelled),
    }
}

/// Raises the interrupt flag when the context's cancellation fires, for the
/// duration of a blocking run. Returns the watcher to abort afterwards.
pub(crate) fn spawn_cancel_watcher(
    context: &ExecutionContext,
    interrupt: &InterruptFlag,
) -> Option<tokio::task::JoinHandle<()>> {
    context.cancel.clone().map(|mut receiver| {
        let flag = interrupt.clone();
        tokio::spawn(async move {
            receiver.cancelled().await;
            flag.raise();
        })
    })
}
