//! Application error types

use thiserror::Error;
use quiver_domain::DomainError;

use crate::engine::ScriptExecutionError;
use crate::ports::TransportError;

/// Application-level errors.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// A domain validation error occurred.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// Script execution failed.
    #[error("script error: {0}")]
    Script(#[from] ScriptExecutionError),

    /// The HTTP transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The trust store failed.
    #[error("trust store error: {0}")]
    TrustStore(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

/// Result type alias for application operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
