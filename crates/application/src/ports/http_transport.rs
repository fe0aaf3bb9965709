//! HTTP transport port

use async_trait::async_trait;
use thiserror::Error;

use quiver_domain::ResponseSpec;

use crate::transport::TransportRequest;

/// Errors surfaced by the transport adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request could not be constructed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A network-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The request timed out.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// Reading a body file from disk failed.
    #[error("failed to read file: {0}")]
    FileRead(String),

    /// The request was cancelled.
    #[error("request cancelled")]
    Cancelled,
}

/// Port for executing a transport-ready request descriptor.
///
/// This trait abstracts the HTTP client implementation, allowing the
/// application layer to be independent of specific HTTP libraries.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Executes the descriptor and returns the captured response.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] on network failure, timeout, or an
    /// unbuildable request.
    async fn execute(&self, request: &TransportRequest) -> Result<ResponseSpec, TransportError>;
}
