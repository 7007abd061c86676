//! Hook registration and event dispatch.
//!
//! Handlers subscribe to an [`EventKind`] with a priority (higher runs
//! earlier; ties break by registration order). An emit invokes every
//! matching handler, honoring per-hook filters and timeouts; handler
//! failures are isolated unless the emit asks to stop on the first error.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::CoreError;
use crate::events::{EventKind, RuntimeEvent};

type HandlerFn = Arc<dyn Fn(RuntimeEvent) -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync>;
type FilterFn = Arc<dyn Fn(&RuntimeEvent) -> bool + Send + Sync>;

/// A handler bound to one event kind, with dispatch options.
#[derive(Clone)]
pub struct Hook {
    pub name: String,
    pub event: EventKind,
    /// Higher priority runs earlier. Defaults to 0.
    pub priority: i32,
    pub once: bool,
    pub timeout: Option<Duration>,
    handler: HandlerFn,
    filter: Option<FilterFn>,
}

impl Hook {
    pub fn new<F, Fut>(name: impl Into<String>, event: EventKind, handler: F) -> Self
    where
        F: Fn(RuntimeEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            event,
            priority: 0,
            once: false,
            timeout: None,
            handler: Arc::new(move |event| handler(event).boxed()),
            filter: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Predicate evaluated against the payload before the handler runs.
    /// A filtered-out emission does not consume a `once` hook.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&RuntimeEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("event", &self.event)
            .field("priority", &self.priority)
            .field("once", &self.once)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// How one handler fared during an emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookStatus {
    Completed,
    Failed,
    TimedOut,
    /// Filter predicate rejected the payload; handler was not invoked.
    Skipped,
}

/// Per-handler result collected by [`HookDispatcher::emit`].
#[derive(Debug, Clone)]
pub struct HookOutcome {
    pub hook_name: String,
    pub status: HookStatus,
    pub error: Option<String>,
    pub duration: Duration,
}

/// Options for a single emission.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmitOptions {
    /// Stop invoking remaining handlers after the first failure.
    pub stop_on_error: bool,
}

struct HookEntry {
    id: u64,
    owner: Option<String>,
    hook: Hook,
}

struct DispatcherInner {
    entries: Mutex<HashMap<EventKind, Vec<HookEntry>>>,
    next_id: AtomicU64,
}

/// Disposable handle to one hook registration. Disposing removes exactly
/// that registration.
pub struct HookRegistration {
    id: u64,
    event: EventKind,
    inner: Weak<DispatcherInner>,
}

impl HookRegistration {
    pub fn dispose(self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut entries = inner.entries.lock();
            if let Some(list) = entries.get_mut(&self.event) {
                list.retain(|entry| entry.id != self.id);
            }
        }
    }
}

/// Ordered hook storage plus the emit loop.
#[derive(Clone)]
pub struct HookDispatcher {
    inner: Arc<DispatcherInner>,
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                entries: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Register a hook, optionally tagged with its owning plugin for bulk
    /// teardown.
    pub fn register(&self, hook: Hook, owner: Option<&str>) -> HookRegistration {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let event = hook.event;
        let entry = HookEntry {
            id,
            owner: owner.map(str::to_string),
            hook,
        };
        self.inner.entries.lock().entry(event).or_default().push(entry);
        HookRegistration {
            id,
            event,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Sugar for registering a plain handler.
    pub fn on<F, Fut>(&self, name: &str, event: EventKind, handler: F) -> HookRegistration
    where
        F: Fn(RuntimeEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        self.register(Hook::new(name, event, handler), None)
    }

    /// Sugar for a handler that self-unregisters after one invocation.
    pub fn once<F, Fut>(&self, name: &str, event: EventKind, handler: F) -> HookRegistration
    where
        F: Fn(RuntimeEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        self.register(Hook::new(name, event, handler).once(), None)
    }

    /// Remove every registration owned by `owner`.
    pub fn unregister_owner(&self, owner: &str) {
        let mut entries = self.inner.entries.lock();
        for list in entries.values_mut() {
            list.retain(|entry| entry.owner.as_deref() != Some(owner));
        }
    }

    /// Number of live registrations for an event kind.
    pub fn handler_count(&self, event: EventKind) -> usize {
        self.inner
            .entries
            .lock()
            .get(&event)
            .map_or(0, |list| list.len())
    }

    /// Invoke all handlers registered for the event's kind, in descending
    /// priority order, and collect a per-handler outcome.
    pub async fn emit(&self, event: RuntimeEvent, opts: EmitOptions) -> Vec<HookOutcome> {
        let kind = event.kind();

        // Snapshot under the lock, then dispatch without holding it so
        // handlers may register or dispose hooks themselves.
        let mut snapshot: Vec<(u64, Hook)> = {
            let entries = self.inner.entries.lock();
            entries
                .get(&kind)
                .map(|list| {
                    list.iter()
                        .map(|entry| (entry.id, entry.hook.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        snapshot.sort_by(|a, b| b.1.priority.cmp(&a.1.priority).then(a.0.cmp(&b.0)));

        let mut outcomes = Vec::with_capacity(snapshot.len());
        for (id, hook) in snapshot {
            if let Some(filter) = &hook.filter {
                if !filter(&event) {
                    outcomes.push(HookOutcome {
                        hook_name: hook.name.clone(),
                        status: HookStatus::Skipped,
                        error: None,
                        duration: Duration::ZERO,
                    });
                    continue;
                }
            }

            let started = Instant::now();
            let invocation = (hook.handler)(event.clone());
            let result = match hook.timeout {
                Some(timeout) => match tokio::time::timeout(timeout, invocation).await {
                    Ok(result) => result,
                    Err(_) => Err(CoreError::Timeout {
                        name: hook.name.clone(),
                        timeout,
                    }),
                },
                None => invocation.await,
            };
            let duration = started.elapsed();

            // A once hook is consumed by its invocation, even a failed one.
            if hook.once {
                self.remove(kind, id);
            }

            let outcome = match result {
                Ok(()) => HookOutcome {
                    hook_name: hook.name.clone(),
                    status: HookStatus::Completed,
                    error: None,
                    duration,
                },
                Err(err) => {
                    let status = if err.is_timeout() {
                        HookStatus::TimedOut
                    } else {
                        HookStatus::Failed
                    };
                    tracing::warn!(hook = %hook.name, error = %err, "hook handler failed");
                    HookOutcome {
                        hook_name: hook.name.clone(),
                        status,
                        error: Some(err.to_string()),
                        duration,
                    }
                }
            };
            let failed = outcome.status != HookStatus::Completed;
            outcomes.push(outcome);

            if failed && opts.stop_on_error {
                break;
            }
        }
        outcomes
    }

    fn remove(&self, event: EventKind, id: u64) {
        let mut entries = self.inner.entries.lock();
        if let Some(list) = entries.get_mut(&event) {
            list.retain(|entry| entry.id != id);
        }
    }
}

impl Default for HookDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
