//! Isolated backend
//!
//! Runs scripts on a pooled dedicated worker thread that shares no state
//! with the host: every capability call is serialized, sent over a channel,
//! dispatched against the host-side bridge, and its result serialized back.
//! The pooled worker is rebuilt per invocation (fresh engine, fresh
//! bindings) so nothing leaks between unrelated scripts, and a hard
//! execution ceiling tears the sandbox down, reported as a timeout distinct
//! from a script error.

use std::rc::Rc;
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use quiver_application::engine::ScriptExecutionError;

use super::{BackendJob, BackendOutcome, IsolationBackend};
use crate::scripting::bridge::{CapabilityCall, ScriptState, dispatch};
use crate::scripting::engine::{
    CapabilityHost, EngineLimits, EngineSetup, InterruptFlag, RunEnd, build_engine, run_script,
};
use crate::scripting::modules::{ModuleKind, register_modules};

/// Poll interval for the host service loop; bounds how quickly cancellation
/// is noticed while the worker is busy.
const POLL: Duration = Duration::from_millis(25);

/// Grace period after raising the interrupt flag before the worker is
/// declared unresponsive and torn down.
const INTERRUPT_GRACE: Duration = Duration::from_millis(500);

/// How a worker run ended, reduced to what may cross the boundary.
#[derive(Debug)]
enum WireFailure {
    Syntax(String),
    Runtime(String),
    Interrupted,
}

enum ToWorker {
    Job(WorkerJob),
    Shutdown,
}

struct WorkerJob {
    script: String,
    modules: Vec<ModuleKind>,
    has_response: bool,
}

enum FromWorker {
    Call(CapabilityCall),
    Done(Result<(), WireFailure>),
}

/// Worker-side capability host: serialize, send, wait for the host's reply.
struct RemoteHost {
    call_tx: Sender<FromWorker>,
    reply_rx: Rc<Receiver<Result<Value, String>>>,
}

impl CapabilityHost for RemoteHost {
    fn invoke(&self, call: CapabilityCall) -> Result<Value, String> {
        self.call_tx
            .send(FromWorker::Call(call))
            .map_err(|_| "capability channel closed".to_string())?;
        self.reply_rx
            .recv()
            .map_err(|_| "capability channel closed".to_string())?
    }
}

fn worker_loop(
    job_rx: &Receiver<ToWorker>,
    call_tx: &Sender<FromWorker>,
    reply_rx: &Rc<Receiver<Result<Value, String>>>,
    interrupt: &InterruptFlag,
) {
    while let Ok(message) = job_rx.recv() {
        let job = match message {
            ToWorker::Shutdown => break,
            ToWorker::Job(job) => job,
        };

        // Fresh engine and bindings per invocation; the pooled resource is
        // the thread, never script-visible state.
        let host: Rc<dyn CapabilityHost> = Rc::new(RemoteHost {
            call_tx: call_tx.clone(),
            reply_rx: Rc::clone(reply_rx),
        });
        let setup = EngineSetup {
            host,
            has_response: job.has_response,
            limits: EngineLimits::constrained(),
            interrupt: interrupt.clone(),
        };
        let (mut engine, timers, mut scope) = build_engine(&setup);
        register_modules(&mut engine, &job.modules, None);

        let end = run_script(&engine, &mut scope, &timers, interrupt, &job.script);
        let done = match end {
            RunEnd::Completed => Ok(()),
            RunEnd::Syntax(message) => Err(WireFailure::Syntax(message)),
            RunEnd::Runtime(message) => Err(WireFailure::Runtime(message)),
            RunEnd::Interrupted => Err(WireFailure::Interrupted),
        };
        if call_tx.send(FromWorker::Done(done)).is_err() {
            break;
        }
    }
}

struct WorkerHandle {
    to_worker: Sender<ToWorker>,
    from_worker: Receiver<FromWorker>,
    reply_tx: Sender<Result<Value, String>>,
    interrupt: InterruptFlag,
}

impl WorkerHandle {
    fn spawn() -> Result<Self, String> {
        let (to_worker, job_rx) = channel::<ToWorker>();
        let (call_tx, from_worker) = channel::<FromWorker>();
        let (reply_tx, reply_rx) = channel::<Result<Value, String>>();
        let interrupt = InterruptFlag::new();

        let worker_interrupt = interrupt.clone();
        std::thread::Builder::new()
            .name("quiver-isolated-worker".to_string())
            .spawn(move || {
                let reply_rx = Rc::new(reply_rx);
                worker_loop(&job_rx, &call_tx, &reply_rx, &worker_interrupt);
            })
            .map_err(|e| format!("failed to spawn sandbox worker: {e}"))?;

        Ok(Self {
            to_worker,
            from_worker,
            reply_tx,
            interrupt,
        })
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.to_worker.send(ToWorker::Shutdown);
    }
}

/// The lazily-created, explicitly-disposable pooled worker slot.
#[derive(Default)]
pub struct WorkerPool {
    slot: Mutex<Option<WorkerHandle>>,
}

impl WorkerPool {
    fn checkout(&self) -> Result<WorkerHandle, String> {
        let taken = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        match taken {
            Some(handle) => Ok(handle),
            None => WorkerHandle::spawn(),
        }
    }

    fn put_back(&self, handle: WorkerHandle) {
        // A worker whose interrupt flag was raised is poisoned; dropping it
        // shuts the thread down and the next invocation spawns a fresh one.
        if handle.interrupt.is_raised() {
            return;
        }
        *self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
    }

    /// Disposes the pooled worker, shutting its thread down.
    pub fn dispose(&self) {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
    }
}

/// The marshalling backend over the worker pool.
#[derive(Default)]
pub struct IsolatedBackend {
    pool: std::sync::Arc<WorkerPool>,
}

impl IsolatedBackend {
    /// Creates the backend with an empty pool; the worker spawns lazily on
    /// first use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Disposes the pooled worker.
    pub fn dispose(&self) {
        self.pool.dispose();
    }
}

#[async_trait]
impl IsolationBackend for IsolatedBackend {
    async fn execute(&self, job: BackendJob) -> Result<BackendOutcome, ScriptExecutionError> {
        let pool = std::sync::Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || service_invocation(&pool, &job))
            .await
            .map_err(|join_error| {
                ScriptExecutionError::SandboxSetup(format!("execution task failed: {join_error}"))
            })?
    }
}

/// Host-side service loop: feed the worker its job, answer capability calls
/// against the bridge, and enforce the execution ceiling.
fn service_invocation(
    pool: &WorkerPool,
    job: &BackendJob,
) -> Result<BackendOutcome, ScriptExecutionError> {
    let mut state = ScriptState::from_context(&job.context);
    let console = job.context.console.clone();
    let cancel = job.context.cancel.clone();

    let worker = pool
        .checkout()
        .map_err(ScriptExecutionError::SandboxSetup)?;

    let mut modules = job.modules.clone();
    modules.retain(|kind| *kind != ModuleKind::Fs);

    let worker_job = WorkerJob {
        script: job.script.clone(),
        modules,
        has_response: job.context.response.is_some(),
    };
    if worker.to_worker.send(ToWorker::Job(worker_job)).is_err() {
        return Err(ScriptExecutionError::SandboxSetup(
            "sandbox worker is unavailable".to_string(),
        ));
    }

    let deadline = Instant::now() + Duration::from_millis(job.timeout_ms);

    loop {
        if Instant::now() >= deadline {
            worker.interrupt.raise();
            drain_until_done(&worker);
            warn!(limit_ms = job.timeout_ms, "sandbox execution ceiling hit; tearing worker down");
            return Err(ScriptExecutionError::Timeout {
                limit_ms: job.timeout_ms,
            });
        }
        if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            worker.interrupt.raise();
            drain_until_done(&worker);
            return Err(ScriptExecutionError::Cancelled);
        }

        match worker.from_worker.recv_timeout(POLL) {
            Ok(FromWorker::Call(call)) => {
                let reply = dispatch(&mut state, console.as_ref(), &call);
                if worker.reply_tx.send(reply).is_err() {
                    return Err(ScriptExecutionError::SandboxSetup(
                        "sandbox worker terminated mid-call".to_string(),
                    ));
                }
            }
            Ok(FromWorker::Done(done)) => {
                let outcome = match done {
                    Ok(()) => Ok(BackendOutcome {
                        state,
                        runtime_error: None,
                    }),
                    Err(WireFailure::Runtime(message)) => Ok(BackendOutcome {
                        state,
                        runtime_error: Some(message),
                    }),
                    Err(WireFailure::Syntax(message)) => {
                        Err(ScriptExecutionError::Syntax(message))
                    }
                    Err(WireFailure::Interrupted) => Err(ScriptExecutionError::Cancelled),
                };
                pool.put_back(worker);
                return outcome;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(ScriptExecutionError::SandboxSetup(
                    "sandbox worker terminated".to_string(),
                ));
            }
        }
    }
}

/// Best-effort wait for the interrupted worker to acknowledge; answers any
/// in-flight capability call with an error so it can unwind. The worker is
/// discarded either way.
fn drain_until_done(worker: &WorkerHandle) {
    let grace_end = Instant::now() + INTERRUPT_GRACE;
    while Instant::now() < grace_end {
        match worker.from_worker.recv_timeout(POLL) {
            Ok(FromWorker::Done(_)) => return,
            Ok(FromWorker::Call(_)) => {
                let _ = worker
                    .reply_tx
                    .send(Err("execution interrupted".to_string()));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
