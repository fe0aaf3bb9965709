//! Quiver Domain - Core types for the scripting and resolution core
//!
//! This crate defines the domain model: the collection tree, request and
//! response specifications, variables and their scope layers, script hooks,
//! auth configuration, sandbox configuration, and test results. All types
//! here are pure Rust with no I/O dependencies.

pub mod auth;
pub mod collection;
pub mod error;
pub mod request;
pub mod response;
pub mod scripting;
pub mod testing;
pub mod variable;

pub use auth::{AuthConfig, AwsV4Config, OAuth2Grant};
pub use collection::{Collection, CollectionItem, Folder, ScopeDefaults};
pub use error::{DomainError, DomainResult};
pub use request::{
    FormField, Header, Headers, HttpMethod, MultipartField, MultipartValue, Param, ParamKind,
    RequestBody, RequestSpec,
};
pub use response::ResponseSpec;
pub use scripting::{
    ConsoleLevel, FilesystemAccess, SandboxMode, ScriptChains, ScriptHooks, ScriptingConfig,
};
pub use testing::{TestResult, TestStatus};
pub use variable::{LayeredVariables, Variable, VariableKind, VariableSet};
