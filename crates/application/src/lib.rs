//! Quiver Application - Use cases and ports for the scripting core
//!
//! Resolves the collection tree into one effective request context, marshals
//! it into a transport-ready descriptor, and drives single-request and batch
//! lifecycles through the script-engine, transport, and trust-store ports.

pub mod engine;
pub mod error;
pub mod ports;
pub mod resolver;
pub mod run;
pub mod transport;
pub mod use_cases;
pub mod variable_store;

pub use engine::{
    ConsoleSink, ExecutionContext, ExecutionPhase, ExecutionResult, ScriptExecutionError,
    VariableMap, sanitize_variables,
};
pub use error::{ApplicationError, ApplicationResult};
pub use ports::{
    CancellationReceiver, CancellationToken, HttpTransport, ScriptEngine, TransportError,
    TrustStore, TrustStoreError, cancellation_pair,
};
pub use resolver::{ResolvedRequest, resolve};
pub use run::{BatchEntry, BatchRunner};
pub use transport::{
    BasicCredentials, DigestCredentials, TransportBody, TransportPart, TransportRequest,
    into_transport, strip_comments,
};
pub use use_cases::{RunOptions, RunOutcome, RunRequest};
pub use variable_store::{SharedVariableStore, VariableSnapshot};
