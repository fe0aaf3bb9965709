//! Script execution: dispatcher, capability bridge, backends, module table.

pub mod backend;
pub mod bridge;
pub mod engine;
pub mod fs_guard;
pub mod modules;
pub mod runtime;

pub use backend::{
    BackendJob, BackendOutcome, IsolatedBackend, IsolationBackend, PortableBackend,
    UnrestrictedBackend,
};
pub use bridge::{CapabilityCall, ScriptState, dispatch};
pub use engine::{CapabilityHost, EngineLimits, InterruptFlag};
pub use fs_guard::PathGuard;
pub use modules::{FIXED_ALLOWLIST, ModuleKind, register_modules, resolve_modules};
pub use runtime::ScriptRuntime;
