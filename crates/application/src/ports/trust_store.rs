//! Trust gate port
//!
//! Persisted allowlist of collection paths permitted to execute scripts.
//! The core never runs a script for a collection path the store does not
//! contain.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors surfaced by a trust store implementation.
#[derive(Debug, Error)]
pub enum TrustStoreError {
    /// Reading or writing the backing store failed.
    #[error("trust store I/O error: {0}")]
    Io(String),
}

/// Port over the persisted trusted-collections allowlist.
pub trait TrustStore: Send + Sync {
    /// Returns true when the collection path is trusted.
    fn exists(&self, path: &Path) -> bool;

    /// Adds a collection path to the allowlist.
    ///
    /// # Errors
    ///
    /// Returns an error when persisting the allowlist fails.
    fn add(&self, path: &Path) -> Result<(), TrustStoreError>;

    /// Returns every trusted collection path.
    fn get_all(&self) -> Vec<PathBuf>;
}
