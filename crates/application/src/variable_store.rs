//! Shared per-collection variable stores
//!
//! Each script invocation copies the stores in, executes against the copy,
//! and merges the sanitized result back. Merges are serialized through one
//! mutex, giving last-completed-write-wins per variable name when a run
//! executes requests concurrently.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::engine::VariableMap;

#[derive(Debug, Default)]
struct Stores {
    env_vars: VariableMap,
    collection_vars: VariableMap,
}

/// A point-in-time copy of both stores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableSnapshot {
    /// Environment variables.
    pub env_vars: VariableMap,
    /// Collection variables.
    pub collection_vars: VariableMap,
}

/// The shared store, exclusively owned by one collection.
#[derive(Debug, Clone, Default)]
pub struct SharedVariableStore {
    inner: Arc<Mutex<Stores>>,
}

impl SharedVariableStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with initial variables.
    #[must_use]
    pub fn with_initial(env_vars: VariableMap, collection_vars: VariableMap) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Stores {
                env_vars,
                collection_vars,
            })),
        }
    }

    /// Copies both stores out for an invocation.
    pub async fn snapshot(&self) -> VariableSnapshot {
        let stores = self.inner.lock().await;
        VariableSnapshot {
            env_vars: stores.env_vars.clone(),
            collection_vars: stores.collection_vars.clone(),
        }
    }

    /// Merges an invocation's resulting stores back, per-name upsert. The
    /// mutex is the single-writer point; whichever invocation merges last
    /// wins for a contended name.
    pub async fn merge_back(&self, env_vars: &VariableMap, collection_vars: &VariableMap) {
        let mut stores = self.inner.lock().await;
        for (name, value) in env_vars {
            stores.env_vars.insert(name.clone(), value.clone());
        }
        for (name, value) in collection_vars {
            stores.collection_vars.insert(name.clone(), value.clone());
        }
    }
}
