//! Run Request use case
//!
//! One request's full lifecycle, strictly sequential: trust gate → resolve →
//! pre-request script → transport → post-response script → test script →
//! merge-back. Scripts never run for an untrusted collection path.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use quiver_domain::{Collection, ResponseSpec, ScriptingConfig, TestResult};

use crate::engine::{ConsoleSink, ExecutionContext, ExecutionPhase, ExecutionResult};
use crate::error::{ApplicationError, ApplicationResult};
use crate::ports::{CancellationReceiver, HttpTransport, ScriptEngine, TransportError, TrustStore};
use crate::resolver::{ResolvedRequest, resolve};
use crate::transport::{TransportRequest, into_transport};
use crate::variable_store::SharedVariableStore;

/// Per-run options shared by every request in a batch.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Scripting configuration (whitelist, roots, filesystem gate).
    pub config: ScriptingConfig,
    /// Process environment snapshot exposed to scripts.
    pub process_env: HashMap<String, String>,
    /// Console sink for script console calls.
    pub console: Option<ConsoleSink>,
    /// Cooperative cancellation handle.
    pub cancel: Option<CancellationReceiver>,
}

/// What one completed lifecycle produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// The transport request as it was sent (after pre-request mutation).
    pub request: TransportRequest,
    /// The response, possibly mutated by the post-response script.
    pub response: Option<ResponseSpec>,
    /// Test results in registration order.
    pub test_results: Vec<TestResult>,
    /// The next-request pointer, when a script set one.
    pub next_request_name: Option<String>,
}

/// Use case driving one request's lifecycle through the ports.
pub struct RunRequest<E, T, S> {
    engine: Arc<E>,
    transport: Arc<T>,
    trust: Arc<S>,
}

impl<E, T, S> RunRequest<E, T, S>
where
    E: ScriptEngine,
    T: HttpTransport,
    S: TrustStore,
{
    /// Creates the use case over its three ports.
    pub const fn new(engine: Arc<E>, transport: Arc<T>, trust: Arc<S>) -> Self {
        Self {
            engine,
            transport,
            trust,
        }
    }

    /// Executes the request with the given id.
    ///
    /// # Errors
    ///
    /// Returns an error when resolution fails, a script fails to parse or
    /// times out, the transport fails, or the run is cancelled.
    pub async fn execute(
        &self,
        collection: &Collection,
        request_id: Uuid,
        store: &SharedVariableStore,
        options: &RunOptions,
    ) -> ApplicationResult<RunOutcome> {
        let resolved = resolve(collection, request_id)?;
        let trusted = self.trust.exists(&collection.pathname);
        if !trusted && !resolved.chains.pre_request.is_empty() {
            warn!(
                collection = %collection.pathname.display(),
                "collection is not trusted; scripts will not run"
            );
        }

        let mut request = into_transport(&resolved, &collection.pathname);
        let mut next_request_name = None;
        let mut test_results = Vec::new();

        // Pre-request phase.
        if trusted && !resolved.chains.pre_request.is_empty() {
            let script = resolved.chains.joined_pre_request();
            let context = self.context(collection, &resolved, request.clone(), None, store, options);
            let result = self
                .engine
                .run(ExecutionPhase::PreRequest, &script, context.await)
                .await?;
            request = result.request.clone();
            self.absorb(&result, store, &mut next_request_name, &mut test_results)
                .await;
        }

        // Transport phase, abortable while in flight.
        let response = self.send(&request, options).await?;

        // Post-response phase.
        let mut response = Some(response);
        if trusted && !resolved.chains.post_response.is_empty() {
            let script = resolved.chains.joined_post_response();
            let context = self.context(
                collection,
                &resolved,
                request.clone(),
                response.clone(),
                store,
                options,
            );
            let result = self
                .engine
                .run(ExecutionPhase::PostResponse, &script, context.await)
                .await?;
            request = result.request.clone();
            if result.response.is_some() {
                response = result.response.clone();
            }
            self.absorb(&result, store, &mut next_request_name, &mut test_results)
                .await;
        }

        // Tests phase.
        if trusted && !resolved.chains.tests.trim().is_empty() {
            let context = self.context(
                collection,
                &resolved,
                request.clone(),
                response.clone(),
                store,
                options,
            );
            let result = self
                .engine
                .run(ExecutionPhase::Tests, &resolved.chains.tests, context.await)
                .await?;
            self.absorb(&result, store, &mut next_request_name, &mut test_results)
                .await;
        }

        Ok(RunOutcome {
            request,
            response,
            test_results,
            next_request_name,
        })
    }

    async fn context(
        &self,
        collection: &Collection,
        resolved: &ResolvedRequest,
        request: TransportRequest,
        response: Option<ResponseSpec>,
        store: &SharedVariableStore,
        options: &RunOptions,
    ) -> ExecutionContext {
        let snapshot = store.snapshot().await;
        ExecutionContext {
            request,
            response,
            env_vars: snapshot.env_vars,
            collection_vars: snapshot.collection_vars,
            layered_vars: resolved.layered.clone(),
            process_env: options.process_env.clone(),
            collection_path: collection.pathname.clone(),
            console: options.console.clone(),
            config: options.config.clone(),
            cancel: options.cancel.clone(),
        }
    }

    async fn absorb(
        &self,
        result: &ExecutionResult,
        store: &SharedVariableStore,
        next_request_name: &mut Option<String>,
        test_results: &mut Vec<TestResult>,
    ) {
        store
            .merge_back(&result.env_vars, &result.collection_vars)
            .await;
        if result.next_request_name.is_some() {
            next_request_name.clone_from(&result.next_request_name);
        }
        test_results.extend(result.test_results.iter().cloned());
    }

    async fn send(
        &self,
        request: &TransportRequest,
        options: &RunOptions,
    ) -> ApplicationResult<ResponseSpec> {
        match options.cancel.clone() {
            Some(mut cancel) => {
                tokio::select! {
                    result = self.transport.execute(request) => Ok(result?),
                    () = cancel.cancelled() => {
                        Err(ApplicationError::Transport(TransportError::Cancelled))
                    }
                }
            }
            None => Ok(self.transport.execute(request).await?),
        }
    }
}
