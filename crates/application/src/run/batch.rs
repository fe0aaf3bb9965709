//! Batch run driver
//!
//! Executes many request lifecycles, sequentially or concurrently up to a
//! parallelism bound. Within one lifecycle there is no concurrency. The run
//! is abortable between requests at any time; the next-request pointer is
//! honored only by the sequential driver, where reordering is well defined.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;
use uuid::Uuid;

use quiver_domain::Collection;

use crate::error::ApplicationError;
use crate::ports::{CancellationReceiver, HttpTransport, ScriptEngine, TrustStore};
use crate::use_cases::{RunOptions, RunOutcome, RunRequest};
use crate::variable_store::SharedVariableStore;

/// One completed (or failed) lifecycle inside a batch.
#[derive(Debug)]
pub struct BatchEntry {
    /// The request's id.
    pub request_id: Uuid,
    /// The request's name, when it resolved.
    pub name: Option<String>,
    /// The lifecycle outcome. A failed entry does not stop the batch.
    pub outcome: Result<RunOutcome, ApplicationError>,
}

/// Batch driver over the run-request use case.
pub struct BatchRunner<E, T, S> {
    run_request: Arc<RunRequest<E, T, S>>,
    parallelism: usize,
}

impl<E, T, S> BatchRunner<E, T, S>
where
    E: ScriptEngine + 'static,
    T: HttpTransport + 'static,
    S: TrustStore + 'static,
{
    /// Creates a driver with the given parallelism bound (minimum 1).
    pub fn new(run_request: Arc<RunRequest<E, T, S>>, parallelism: usize) -> Self {
        Self {
            run_request,
            parallelism: parallelism.max(1),
        }
    }

    /// Runs the given requests and returns one entry per executed lifecycle.
    ///
    /// With parallelism 1 the requests run in order and a script-set
    /// next-request pointer jumps to the named request. With parallelism
    /// above 1 lifecycles overlap up to the bound and the pointer is logged
    /// and ignored.
    pub async fn run(
        &self,
        collection: Arc<Collection>,
        request_ids: Vec<Uuid>,
        store: SharedVariableStore,
        options: RunOptions,
        cancel: Option<CancellationReceiver>,
    ) -> Vec<BatchEntry> {
        if self.parallelism == 1 {
            self.run_sequential(&collection, request_ids, &store, &options, cancel.as_ref())
                .await
        } else {
            self.run_concurrent(collection, request_ids, store, options, cancel)
                .await
        }
    }

    async fn run_sequential(
        &self,
        collection: &Collection,
        request_ids: Vec<Uuid>,
        store: &SharedVariableStore,
        options: &RunOptions,
        cancel: Option<&CancellationReceiver>,
    ) -> Vec<BatchEntry> {
        let mut entries = Vec::with_capacity(request_ids.len());
        let mut index = 0usize;

        while index < request_ids.len() {
            if cancel.is_some_and(CancellationReceiver::is_cancelled) {
                break;
            }

            let request_id = request_ids[index];
            let name = request_name(collection, request_id);
            let outcome = self
                .run_request
                .execute(collection, request_id, store, options)
                .await;

            let jump = match &outcome {
                Ok(run) => run.next_request_name.clone(),
                Err(_) => None,
            };

            entries.push(BatchEntry {
                request_id,
                name,
                outcome,
            });

            index = match jump {
                Some(target_name) => {
                    match position_of(collection, &request_ids, &target_name) {
                        Some(target) => target,
                        None => {
                            warn!(target = %target_name, "next-request target not in run; continuing in order");
                            index + 1
                        }
                    }
                }
                None => index + 1,
            };
        }

        entries
    }

    async fn run_concurrent(
        &self,
        collection: Arc<Collection>,
        request_ids: Vec<Uuid>,
        store: SharedVariableStore,
        options: RunOptions,
        cancel: Option<CancellationReceiver>,
    ) -> Vec<BatchEntry> {
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut join_set = JoinSet::new();

        for request_id in request_ids {
            if cancel
                .as_ref()
                .is_some_and(CancellationReceiver::is_cancelled)
            {
                break;
            }

            let semaphore = Arc::clone(&semaphore);
            let run_request = Arc::clone(&self.run_request);
            let collection = Arc::clone(&collection);
            let store = store.clone();
            let options = options.clone();
            let cancel = cancel.clone();

            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return BatchEntry {
                        request_id,
                        name: None,
                        outcome: Err(ApplicationError::Cancelled),
                    };
                };
                if cancel
                    .as_ref()
                    .is_some_and(CancellationReceiver::is_cancelled)
                {
                    return BatchEntry {
                        request_id,
                        name: None,
                        outcome: Err(ApplicationError::Cancelled),
                    };
                }

                let name = request_name(&collection, request_id);
                let outcome = run_request
                    .execute(&collection, request_id, &store, &options)
                    .await;
                if let Ok(run) = &outcome {
                    if let Some(target) = &run.next_request_name {
                        warn!(target = %target, "next-request is ignored in a concurrent run");
                    }
                }
                BatchEntry {
                    request_id,
                    name,
                    outcome,
                }
            });
        }

        let mut entries = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(entry) => entries.push(entry),
                Err(join_error) => {
                    warn!(error = %join_error, "batch lifecycle task failed to join");
                }
            }
        }
        entries.sort_by_key(|e| e.request_id);
        entries
    }
}

fn request_name(collection: &Collection, request_id: Uuid) -> Option<String> {
    collection
        .tree_path(request_id)
        .and_then(|path| path.last().map(|item| item.name().to_string()))
}

fn position_of(collection: &Collection, request_ids: &[Uuid], name: &str) -> Option<usize> {
    request_ids
        .iter()
        .position(|id| request_name(collection, *id).as_deref() == Some(name))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use quiver_domain::{CollectionItem, RequestSpec, ResponseSpec, ScriptHooks};

    use crate::engine::{
        ExecutionContext, ExecutionPhase, ExecutionResult, ScriptExecutionError,
    };
    use crate::ports::{TransportError, TrustStoreError, cancellation_pair};
    use crate::transport::TransportRequest;

    /// Engine that records script order and honors a `jump:<name>` marker.
    struct MarkerEngine {
        seen: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl ScriptEngine for MarkerEngine {
        async fn run(
            &self,
            _phase: ExecutionPhase,
            script: &str,
            context: ExecutionContext,
        ) -> Result<ExecutionResult, ScriptExecutionError> {
            self.seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(script.to_string());
            let next_request_name = script
                .strip_prefix("jump:")
                .map(|target| target.trim().to_string());
            Ok(ExecutionResult {
                request: context.request,
                response: context.response,
                env_vars: context.env_vars,
                collection_vars: context.collection_vars,
                next_request_name,
                test_results: vec![],
            })
        }
    }

    struct StaticTransport;

    #[async_trait]
    impl HttpTransport for StaticTransport {
        async fn execute(
            &self,
            _request: &TransportRequest,
        ) -> Result<ResponseSpec, TransportError> {
            Ok(ResponseSpec::new(
                200,
                HashMap::new(),
                vec![],
                Duration::from_millis(1),
            ))
        }
    }

    struct TrustAll;

    impl TrustStore for TrustAll {
        fn exists(&self, _path: &Path) -> bool {
            true
        }
        fn add(&self, _path: &Path) -> Result<(), TrustStoreError> {
            Ok(())
        }
        fn get_all(&self) -> Vec<PathBuf> {
            vec![]
        }
    }

    fn request_with_pre(name: &str, pre: &str) -> RequestSpec {
        let mut request = RequestSpec::get(name, "https://example.com");
        request.hooks = ScriptHooks {
            pre_request: Some(pre.to_string()),
            post_response: None,
            tests: None,
        };
        request
    }

    fn runner(
        seen: Arc<StdMutex<Vec<String>>>,
        parallelism: usize,
    ) -> BatchRunner<MarkerEngine, StaticTransport, TrustAll> {
        let use_case = RunRequest::new(
            Arc::new(MarkerEngine { seen }),
            Arc::new(StaticTransport),
            Arc::new(TrustAll),
        );
        BatchRunner::new(Arc::new(use_case), parallelism)
    }

    #[tokio::test]
    async fn test_sequential_next_request_jump() {
        let mut collection = Collection::new("C", "/tmp/c");
        let first = request_with_pre("first", "jump:third");
        let second = request_with_pre("second", "s2");
        let third = request_with_pre("third", "s3");
        let ids = vec![first.id, second.id, third.id];
        collection.add_item(CollectionItem::Request(first));
        collection.add_item(CollectionItem::Request(second));
        collection.add_item(CollectionItem::Request(third));

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let runner = runner(Arc::clone(&seen), 1);

        let entries = runner
            .run(
                Arc::new(collection),
                ids,
                SharedVariableStore::new(),
                RunOptions::default(),
                None,
            )
            .await;

        let names: Vec<Option<String>> = entries.iter().map(|e| e.name.clone()).collect();
        assert_eq!(
            names,
            vec![Some("first".to_string()), Some("third".to_string())]
        );
    }

    #[tokio::test]
    async fn test_cancel_between_requests() {
        let mut collection = Collection::new("C", "/tmp/c");
        let first = request_with_pre("first", "s1");
        let second = request_with_pre("second", "s2");
        let ids = vec![first.id, second.id];
        collection.add_item(CollectionItem::Request(first));
        collection.add_item(CollectionItem::Request(second));

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let runner = runner(Arc::clone(&seen), 1);

        let (token, receiver) = cancellation_pair();
        token.cancel();

        let entries = runner
            .run(
                Arc::new(collection),
                ids,
                SharedVariableStore::new(),
                RunOptions::default(),
                Some(receiver),
            )
            .await;

        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_runs_every_request() {
        let mut collection = Collection::new("C", "/tmp/c");
        let mut ids = Vec::new();
        for i in 0..5 {
            let request = request_with_pre(&format!("r{i}"), &format!("s{i}"));
            ids.push(request.id);
            collection.add_item(CollectionItem::Request(request));
        }

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let runner = runner(Arc::clone(&seen), 3);

        let entries = runner
            .run(
                Arc::new(collection),
                ids,
                SharedVariableStore::new(),
                RunOptions::default(),
                None,
            )
            .await;

        assert_eq!(entries.len(), 5);
        assert!(entries.iter().all(|e| e.outcome.is_ok()));
    }
}
