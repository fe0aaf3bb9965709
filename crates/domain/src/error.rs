//! Domain error types

use thiserror::Error;

/// Domain-level errors that can occur during validation or processing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The provided URL is invalid or malformed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The HTTP method is not supported.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// The sandbox mode string is not recognized.
    #[error("unknown sandbox mode: {0}")]
    UnknownSandboxMode(String),

    /// A collection item has an invalid structure.
    #[error("invalid collection item: {0}")]
    InvalidCollectionItem(String),

    /// The referenced item does not exist in the collection.
    #[error("item not found in collection: {0}")]
    ItemNotFound(String),
}

/// Result type alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
