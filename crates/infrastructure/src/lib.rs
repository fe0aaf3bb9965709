//! Quiver Infrastructure - Adapters for the scripting core
//!
//! The script runtime dispatcher and its three isolation backends, the
//! module access controller, the reqwest transport adapter, and the
//! file-backed trust store.

pub mod http;
pub mod scripting;
pub mod trust;

pub use http::{BuiltBody, ReqwestTransport, build_body};
pub use scripting::{
    CapabilityCall, IsolatedBackend, IsolationBackend, ModuleKind, PathGuard, PortableBackend,
    ScriptRuntime, ScriptState, UnrestrictedBackend, resolve_modules,
};
pub use trust::FileTrustStore;
