//! Generic execution of named asynchronous operations.
//!
//! [`OperationRunner`] adds timeout, fixed-delay retry, success/error/finally
//! callbacks, per-id single-flight de-duplication and batch helpers
//! (parallel fail-fast, strict sequence, concurrency-limited) on top of
//! plain `async` closures.
//!
//! Timeouts are races, not preemption: on expiry the attempt is abandoned
//! and a [`CoreError::Timeout`] surfaces, while the spawned work may still
//! finish in the background with its result discarded.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;

type ExecuteFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, CoreError>> + Send + Sync>;
type SuccessFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync>;
type ErrorFn = Arc<dyn Fn(CoreError) -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync>;
type FinallyFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync>;

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

/// A named asynchronous unit of work with execution options.
#[derive(Clone)]
pub struct AsyncOperation {
    pub id: String,
    pub name: String,
    execute: ExecuteFn,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    on_success: Option<SuccessFn>,
    on_error: Option<ErrorFn>,
    on_finally: Option<FinallyFn>,
}

impl AsyncOperation {
    pub fn new<F, Fut>(name: impl Into<String>, execute: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CoreError>> + Send + 'static,
    {
        let name = name.into();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            execute: Arc::new(move || execute().boxed()),
            timeout: None,
            retry: None,
            on_success: None,
            on_error: None,
            on_finally: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn on_success<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        self.on_success = Some(Arc::new(move |value| callback(value).boxed()));
        self
    }

    pub fn on_error<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(CoreError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        self.on_error = Some(Arc::new(move |err| callback(err).boxed()));
        self
    }

    pub fn on_finally<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        self.on_finally = Some(Arc::new(move || callback().boxed()));
        self
    }
}

impl std::fmt::Debug for AsyncOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncOperation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Runner-wide defaults, fed from the runtime configuration.
#[derive(Debug, Clone, Copy)]
pub struct RunnerDefaults {
    /// Timeout applied when an operation declares none. `None` disables it.
    pub timeout: Option<Duration>,
    /// Concurrency cap for [`OperationRunner::run_batch`].
    pub max_concurrency: usize,
}

impl Default for RunnerDefaults {
    fn default() -> Self {
        Self {
            timeout: None,
            max_concurrency: 10,
        }
    }
}

type InFlight = Shared<BoxFuture<'static, Result<Value, CoreError>>>;

struct RunnerInner {
    operations: DashMap<String, Arc<AsyncOperation>>,
    inflight: DashMap<String, InFlight>,
    defaults: RunnerDefaults,
}

/// Executes [`AsyncOperation`]s. Cheap to clone.
#[derive(Clone)]
pub struct OperationRunner {
    inner: Arc<RunnerInner>,
}

impl OperationRunner {
    pub fn new(defaults: RunnerDefaults) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                operations: DashMap::new(),
                inflight: DashMap::new(),
                defaults,
            }),
        }
    }

    /// Register an operation for later [`run_by_id`](Self::run_by_id) calls.
    pub fn register(&self, operation: AsyncOperation) {
        self.inner
            .operations
            .insert(operation.id.clone(), Arc::new(operation));
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.inner.operations.remove(id).is_some()
    }

    /// Execute one operation with its timeout/retry options and callbacks.
    pub async fn run(&self, operation: &AsyncOperation) -> Result<Value, CoreError> {
        let result = drive(operation.clone(), self.inner.defaults).await;

        // Callbacks are awaited around the outcome; their own failures are
        // logged and never mask it.
        match &result {
            Ok(value) => {
                if let Some(callback) = &operation.on_success {
                    if let Err(err) = callback(value.clone()).await {
                        tracing::warn!(operation = %operation.name, error = %err, "on_success callback failed");
                    }
                }
            }
            Err(original) => {
                if let Some(callback) = &operation.on_error {
                    if let Err(err) = callback(original.clone()).await {
                        tracing::warn!(operation = %operation.name, error = %err, "on_error callback failed");
                    }
                }
            }
        }
        if let Some(callback) = &operation.on_finally {
            if let Err(err) = callback().await {
                tracing::warn!(operation = %operation.name, error = %err, "on_finally callback failed");
            }
        }
        result
    }

    /// Execute a registered operation, de-duplicating concurrent calls: all
    /// callers for an id share the in-flight outcome, and the marker clears
    /// on completion so the next call starts a fresh execution.
    pub async fn run_by_id(&self, id: &str) -> Result<Value, CoreError> {
        let operation = self
            .inner
            .operations
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CoreError::not_found("operation", id))?;

        let shared = {
            use dashmap::mapref::entry::Entry;
            match self.inner.inflight.entry(id.to_string()) {
                Entry::Occupied(entry) => entry.get().clone(),
                Entry::Vacant(entry) => {
                    let runner = self.clone();
                    let flight_id = id.to_string();
                    let shared: InFlight = async move {
                        let result = runner.run(&operation).await;
                        runner.inner.inflight.remove(&flight_id);
                        result
                    }
                    .boxed()
                    .shared();
                    entry.insert(shared.clone());
                    shared
                }
            }
        };
        shared.await
    }

    /// Run all operations concurrently. Fail-fast: the first error is
    /// returned and the remaining futures are dropped.
    pub async fn run_parallel(&self, operations: &[AsyncOperation]) -> Result<Vec<Value>, CoreError> {
        futures::future::try_join_all(operations.iter().map(|op| self.run(op))).await
    }

    /// Run operations strictly in order, stopping at the first error.
    pub async fn run_sequence(&self, operations: &[AsyncOperation]) -> Result<Vec<Value>, CoreError> {
        let mut results = Vec::with_capacity(operations.len());
        for operation in operations {
            results.push(self.run(operation).await?);
        }
        Ok(results)
    }

    /// Run operations with at most `limit` executing concurrently; completed
    /// slots are refilled from the queue. Results preserve input order.
    pub async fn run_with_concurrency(
        &self,
        operations: &[AsyncOperation],
        limit: usize,
    ) -> Result<Vec<Value>, CoreError> {
        if limit == 0 {
            return Err(CoreError::Validation(
                "concurrency limit must be at least 1".into(),
            ));
        }
        stream::iter(operations.iter().map(|op| self.run(op)))
            .buffered(limit)
            .try_collect()
            .await
    }

    /// As [`run_with_concurrency`](Self::run_with_concurrency), using the
    /// configured default limit.
    pub async fn run_batch(&self, operations: &[AsyncOperation]) -> Result<Vec<Value>, CoreError> {
        self.run_with_concurrency(operations, self.inner.defaults.max_concurrency)
            .await
    }

    pub fn defaults(&self) -> RunnerDefaults {
        self.inner.defaults
    }
}

impl Default for OperationRunner {
    fn default() -> Self {
        Self::new(RunnerDefaults::default())
    }
}

/// One full execution: retry loop around timed attempts.
async fn drive(operation: AsyncOperation, defaults: RunnerDefaults) -> Result<Value, CoreError> {
    let max_attempts = operation.retry.map(|r| r.max_attempts.max(1)).unwrap_or(1);
    let delay = operation.retry.map(|r| r.delay).unwrap_or(Duration::ZERO);
    let timeout = operation.timeout.or(defaults.timeout);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match attempt_once(&operation, timeout).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts => {
                tracing::debug!(
                    operation = %operation.name,
                    attempt,
                    max_attempts,
                    error = %err,
                    "operation attempt failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(err) => return Err(err),
        }
    }
}

async fn attempt_once(
    operation: &AsyncOperation,
    timeout: Option<Duration>,
) -> Result<Value, CoreError> {
    let fut = (operation.execute)();
    let Some(timeout) = timeout else {
        return fut.await;
    };

    // Race against the timer. The spawned work is abandoned on expiry, not
    // aborted; a late result is discarded.
    let mut handle = tokio::spawn(fut);
    tokio::select! {
        joined = &mut handle => match joined {
            Ok(result) => result,
            Err(join_err) => Err(CoreError::execution(operation.name.clone(), join_err)),
        },
        _ = tokio::time::sleep(timeout) => Err(CoreError::Timeout {
            name: operation.name.clone(),
            timeout,
        }),
    }
}
