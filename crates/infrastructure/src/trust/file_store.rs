//! File-backed trusted-collections store
//!
//! Persists the allowlist of collection paths permitted to run scripts as a
//! JSON document. A path is only added when it actually exists on disk, and
//! adding an already-trusted path is a no-op.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use quiver_application::ports::{TrustStore, TrustStoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrustedEntry {
    path: PathBuf,
    trusted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TrustFile {
    #[serde(default)]
    trusted_collections: Vec<TrustedEntry>,
}

/// JSON-file trust store.
#[derive(Debug)]
pub struct FileTrustStore {
    store_path: PathBuf,
    entries: Mutex<Vec<TrustedEntry>>,
}

impl FileTrustStore {
    /// Opens (or initializes) the store at the given file path.
    ///
    /// A missing or unreadable file starts empty; a corrupt file is treated
    /// as empty rather than an error, so a damaged preferences file never
    /// blocks the application.
    #[must_use]
    pub fn open(store_path: impl Into<PathBuf>) -> Self {
        let store_path = store_path.into();
        let entries = std::fs::read_to_string(&store_path)
            .ok()
            .and_then(|content| serde_json::from_str::<TrustFile>(&content).ok())
            .map(|file| file.trusted_collections)
            .unwrap_or_default();

        Self {
            store_path,
            entries: Mutex::new(entries),
        }
    }

    fn persist(&self, entries: &[TrustedEntry]) -> Result<(), TrustStoreError> {
        let file = TrustFile {
            trusted_collections: entries.to_vec(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| TrustStoreError::Io(e.to_string()))?;

        if let Some(parent) = self.store_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TrustStoreError::Io(e.to_string()))?;
        }
        std::fs::write(&self.store_path, content).map_err(|e| TrustStoreError::Io(e.to_string()))
    }
}

impl TrustStore for FileTrustStore {
    fn exists(&self, path: &Path) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .any(|entry| entry.path == path)
    }

    fn add(&self, path: &Path) -> Result<(), TrustStoreError> {
        if !path.exists() {
            warn!(path = %path.display(), "refusing to trust a collection path that does not exist");
            return Ok(());
        }

        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if entries.iter().any(|entry| entry.path == path) {
            return Ok(());
        }

        entries.push(TrustedEntry {
            path: path.to_path_buf(),
            trusted_at: Utc::now(),
        });
        self.persist(&entries)
    }

    fn get_all(&self) -> Vec<PathBuf> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .map(|entry| entry.path.clone())
            .collect()
    }
}
