//! Recurring task scheduler.
//!
//! Tasks fire on a fixed interval or a restricted cron expression (named presets
//! plus `*/n` in the minute or hour field; deliberately not a full cron
//! parser). Firings go through the [`OperationRunner`] so the runtime's
//! task timeout applies; task failures are counted and logged, never
//! propagated into the scheduler's own control flow. Overlapping firings of
//! one task are permitted; serialize inside the task body when needed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;
use crate::events::RuntimeEvent;
use crate::hooks::{EmitOptions, HookDispatcher};
use crate::runner::{AsyncOperation, OperationRunner};

const MINUTE_MS: u64 = 60_000;
const HOUR_MS: u64 = 3_600_000;
const DAY_MS: u64 = 86_400_000;

/// Resolve a restricted cron expression to its fixed period.
///
/// Supported: `@yearly @monthly @weekly @daily @hourly @minutely`, plus
/// `*/n` in the minute field (`"*/5 * * * *"` = 5 minutes) or the hour
/// field (`"0 */3 * * *"` = 3 hours). Anything else is rejected.
pub fn parse_cron(expr: &str) -> Result<Duration, CoreError> {
    let period_ms = match expr.trim() {
        "@minutely" => MINUTE_MS,
        "@hourly" => HOUR_MS,
        "@daily" => DAY_MS,
        "@weekly" => 7 * DAY_MS,
        "@monthly" => 30 * DAY_MS,
        "@yearly" => 365 * DAY_MS,
        other => {
            let fields: Vec<&str> = other.split_whitespace().collect();
            if fields.len() != 5 {
                return Err(CoreError::Validation(format!(
                    "unsupported cron expression '{expr}': expected a named preset \
                     (@yearly, @monthly, @weekly, @daily, @hourly, @minutely) or a \
                     five-field expression"
                )));
            }
            if let Some(n) = parse_step(fields[0]) {
                if fields[1..].iter().any(|f| *f != "*") {
                    return Err(CoreError::Validation(format!(
                        "unsupported cron expression '{expr}': only '*/n' in the \
                         minute field with '*' elsewhere is supported"
                    )));
                }
                n.checked_mul(MINUTE_MS).ok_or_else(|| {
                    CoreError::Validation(format!("cron step overflows in '{expr}'"))
                })?
            } else if let Some(n) = parse_step(fields[1]) {
                if fields[0].parse::<u64>().is_err() || fields[2..].iter().any(|f| *f != "*") {
                    return Err(CoreError::Validation(format!(
                        "unsupported cron expression '{expr}': only 'm */n * * *' \
                         hour patterns are supported"
                    )));
                }
                n.checked_mul(HOUR_MS).ok_or_else(|| {
                    CoreError::Validation(format!("cron step overflows in '{expr}'"))
                })?
            } else {
                return Err(CoreError::Validation(format!(
                    "unsupported cron expression '{expr}': this is not a full cron \
                     parser; use an interval for anything beyond presets and '*/n'"
                )));
            }
        }
    };
    Ok(Duration::from_millis(period_ms))
}

fn parse_step(field: &str) -> Option<u64> {
    let n = field.strip_prefix("*/")?.parse::<u64>().ok()?;
    (n > 0).then_some(n)
}

/// Executor invoked on each firing.
pub type TaskExecutor = Arc<dyn Fn() -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync>;

/// Options accepted by [`Scheduler::schedule`]. Exactly one of `interval`
/// and `cron` must be set.
#[derive(Clone, Default)]
pub struct ScheduleOptions {
    pub name: String,
    pub interval: Option<Duration>,
    pub cron: Option<String>,
    /// Disable the task after its first run, successful or not.
    pub run_once: bool,
    /// Fire once as soon as the task starts ticking.
    pub immediate: bool,
}

impl ScheduleOptions {
    pub fn interval(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval: Some(interval),
            ..Default::default()
        }
    }

    pub fn cron(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cron: Some(expr.into()),
            ..Default::default()
        }
    }

    pub fn run_once(mut self) -> Self {
        self.run_once = true;
        self
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }
}

/// Read-only view of a task's state and counters.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: String,
    pub name: String,
    pub period: Duration,
    pub enabled: bool,
    pub run_once: bool,
    pub run_count: u64,
    pub error_count: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct TaskCounters {
    run_count: u64,
    error_count: u64,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
}

struct TaskState {
    id: String,
    name: String,
    period: Duration,
    run_once: bool,
    immediate: bool,
    executor: TaskExecutor,
    enabled: AtomicBool,
    counters: Mutex<TaskCounters>,
    driver: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

struct SchedulerInner {
    tasks: Mutex<HashMap<String, Arc<TaskState>>>,
    running: AtomicBool,
    runner: OperationRunner,
    task_timeout: Option<Duration>,
    dispatcher: Option<HookDispatcher>,
}

/// Interval/cron task scheduler. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(runner: OperationRunner, task_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                tasks: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
                runner,
                task_timeout,
                dispatcher: None,
            }),
        }
    }

    /// Emit task lifecycle events through the given dispatcher.
    pub fn with_dispatcher(
        runner: OperationRunner,
        task_timeout: Option<Duration>,
        dispatcher: HookDispatcher,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                tasks: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
                runner,
                task_timeout,
                dispatcher: Some(dispatcher),
            }),
        }
    }

    /// Create a task. Starts ticking immediately when the scheduler is
    /// running. Returns the task id.
    pub fn schedule<F, Fut>(&self, execute: F, opts: ScheduleOptions) -> Result<String, CoreError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CoreError>> + Send + 'static,
    {
        let period = match (opts.interval, &opts.cron) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(CoreError::Validation(format!(
                    "task '{}' must set exactly one of interval and cron",
                    opts.name
                )))
            }
            (Some(interval), None) => {
                if interval.is_zero() {
                    return Err(CoreError::Validation(format!(
                        "task '{}' declares a zero interval",
                        opts.name
                    )));
                }
                interval
            }
            (None, Some(expr)) => parse_cron(expr)?,
        };

        let task = Arc::new(TaskState {
            id: Uuid::new_v4().to_string(),
            name: opts.name,
            period,
            run_once: opts.run_once,
            immediate: opts.immediate,
            executor: Arc::new(move || execute().boxed()),
            enabled: AtomicBool::new(true),
            counters: Mutex::new(TaskCounters::default()),
            driver: Mutex::new(None),
        });
        let id = task.id.clone();

        self.inner.tasks.lock().insert(id.clone(), task.clone());
        tracing::debug!(
            task = %task.name,
            id = %id,
            period_ms = period.as_millis() as u64,
            "task scheduled"
        );

        if self.inner.running.load(Ordering::SeqCst) {
            self.spawn_driver(task);
        }
        Ok(id)
    }

    /// Begin firing enabled tasks.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let tasks: Vec<Arc<TaskState>> = self.inner.tasks.lock().values().cloned().collect();
        for task in tasks {
            if task.enabled.load(Ordering::SeqCst) {
                self.spawn_driver(task);
            }
        }
        tracing::info!("scheduler started");
    }

    /// Stop firing. Task state and counters are retained.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for task in self.inner.tasks.lock().values() {
            if let Some(handle) = task.driver.lock().take() {
                handle.abort();
            }
            task.counters.lock().next_run = None;
        }
        tracing::info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Re-enable a disabled task; it resumes ticking if the scheduler runs.
    pub fn enable(&self, id: &str) -> Result<(), CoreError> {
        let task = self.task_state(id)?;
        if !task.enabled.swap(true, Ordering::SeqCst) && self.inner.running.load(Ordering::SeqCst) {
            self.spawn_driver(task);
        }
        Ok(())
    }

    /// Disable a task. It keeps its counters but stops firing.
    pub fn disable(&self, id: &str) -> Result<(), CoreError> {
        let task = self.task_state(id)?;
        task.enabled.store(false, Ordering::SeqCst);
        if let Some(handle) = task.driver.lock().take() {
            handle.abort();
        }
        task.counters.lock().next_run = None;
        Ok(())
    }

    /// Stop and delete a task.
    pub fn remove(&self, id: &str) -> Result<(), CoreError> {
        let task = self
            .inner
            .tasks
            .lock()
            .remove(id)
            .ok_or_else(|| CoreError::not_found("task", id))?;
        if let Some(handle) = task.driver.lock().take() {
            handle.abort();
        }
        Ok(())
    }

    /// Execute a task immediately, bypassing its timer. Counters update as
    /// for a timed firing.
    pub async fn run_now(&self, id: &str) -> Result<(), CoreError> {
        let task = self.task_state(id)?;
        fire(task, self.inner.clone()).await
    }

    pub fn task(&self, id: &str) -> Option<TaskSnapshot> {
        self.inner.tasks.lock().get(id).map(snapshot)
    }

    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.inner.tasks.lock().values().map(snapshot).collect()
    }

    fn task_state(&self, id: &str) -> Result<Arc<TaskState>, CoreError> {
        self.inner
            .tasks
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("task", id))
    }

    fn spawn_driver(&self, task: Arc<TaskState>) {
        let inner = self.inner.clone();
        let mut driver = task.driver.lock();
        // A run_once driver exits on its own without clearing the slot; a
        // finished handle must not block respawning here.
        if driver.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let loop_task = task.clone();
        *driver = Some(tokio::spawn(async move {
            if loop_task.immediate {
                fire_and_forget(loop_task.clone(), inner.clone());
                if loop_task.run_once {
                    return;
                }
            }
            loop {
                loop_task.counters.lock().next_run = Some(
                    Utc::now() + chrono::Duration::from_std(loop_task.period).unwrap_or_default(),
                );
                tokio::time::sleep(loop_task.period).await;
                if !inner.running.load(Ordering::SeqCst)
                    || !loop_task.enabled.load(Ordering::SeqCst)
                {
                    break;
                }
                fire_and_forget(loop_task.clone(), inner.clone());
                if loop_task.run_once {
                    break;
                }
            }
        }));
    }
}

/// Fire without awaiting completion, so a slow run does not delay the next
/// tick (overlapping firings of one task are allowed).
fn fire_and_forget(task: Arc<TaskState>, inner: Arc<SchedulerInner>) {
    tokio::spawn(async move {
        let _ = fire(task, inner).await;
    });
}

async fn fire(task: Arc<TaskState>, inner: Arc<SchedulerInner>) -> Result<(), CoreError> {
    let executor = task.executor.clone();
    let mut operation = AsyncOperation::new(task.name.clone(), move || {
        let executor = executor.clone();
        async move { executor().await.map(|_| Value::Null) }
    });
    if let Some(timeout) = inner.task_timeout {
        operation = operation.with_timeout(timeout);
    }

    let result = inner.runner.run(&operation).await.map(|_| ());
    let now = Utc::now();

    let run_count = {
        let mut counters = task.counters.lock();
        counters.last_run = Some(now);
        match &result {
            Ok(()) => counters.run_count += 1,
            Err(_) => counters.error_count += 1,
        }
        counters.run_count
    };
    if task.run_once {
        task.enabled.store(false, Ordering::SeqCst);
    }

    match &result {
        Ok(()) => {
            if let Some(dispatcher) = &inner.dispatcher {
                dispatcher
                    .emit(
                        RuntimeEvent::TaskCompleted {
                            task_id: task.id.clone(),
                            run_count,
                        },
                        EmitOptions::default(),
                    )
                    .await;
            }
        }
        Err(err) => {
            tracing::warn!(task = %task.name, error = %err, "scheduled task failed");
            if let Some(dispatcher) = &inner.dispatcher {
                dispatcher
                    .emit(
                        RuntimeEvent::TaskFailed {
                            task_id: task.id.clone(),
                            error: err.to_string(),
                        },
                        EmitOptions::default(),
                    )
                    .await;
            }
        }
    }
    result
}

fn snapshot(task: &Arc<TaskState>) -> TaskSnapshot {
    let counters = task.counters.lock();
    TaskSnapshot {
        id: task.id.clone(),
        name: task.name.clone(),
        period: task.period,
        enabled: task.enabled.load(Ordering::SeqCst),
        run_once: task.run_once,
        run_count: counters.run_count,
        error_count: counters.error_count,
        last_run: counters.last_run,
        next_run: counters.next_run,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunnerDefaults;
    use std::sync::atomic::AtomicUsize;

    fn scheduler() -> Scheduler {
        Scheduler::new(OperationRunner::new(RunnerDefaults::default()), None)
    }

    fn counting_task(counter: Arc<AtomicUsize>) -> impl Fn() -> BoxFuture<'static, Result<(), CoreError>> {
        move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        }
    }

    #[test]
    fn test_cron_presets() {
        assert_eq!(parse_cron("@minutely").unwrap(), Duration::from_millis(60_000));
        assert_eq!(parse_cron("@hourly").unwrap(), Duration::from_millis(3_600_000));
        assert_eq!(parse_cron("@daily").unwrap(), Duration::from_millis(86_400_000));
        assert_eq!(parse_cron("@weekly").unwrap(), Duration::from_millis(604_800_000));
        assert_eq!(
            parse_cron("@monthly").unwrap(),
            Duration::from_millis(2_592_000_000)
        );
        assert_eq!(
            parse_cron("@yearly").unwrap(),
            Duration::from_millis(31_536_000_000)
        );
    }

    #[test]
    fn test_cron_step_patterns() {
        assert_eq!(
            parse_cron("*/5 * * * *").unwrap(),
            Duration::from_millis(300_000)
        );
        assert_eq!(
            parse_cron("0 */3 * * *").unwrap(),
            Duration::from_millis(10_800_000)
        );
    }

    #[test]
    fn test_cron_garbage_rejected_with_description() {
        let err = parse_cron("garbage").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(err.to_string().contains("garbage"));

        // Full cron syntax is out of scope on purpose.
        assert!(parse_cron("15 4 * * 2").is_err());
        assert!(parse_cron("*/0 * * * *").is_err());
        assert!(parse_cron("*/5 1 * * *").is_err());
    }

    #[test]
    fn test_schedule_requires_exactly_one_trigger() {
        let scheduler = scheduler();
        let err = scheduler
            .schedule(
                || async { Ok(()) },
                ScheduleOptions {
                    name: "both".into(),
                    interval: Some(Duration::from_secs(1)),
                    cron: Some("@daily".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = scheduler
            .schedule(
                || async { Ok(()) },
                ScheduleOptions {
                    name: "neither".into(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_firing_updates_counters() {
        let scheduler = scheduler();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = scheduler
            .schedule(
                counting_task(fired.clone()),
                ScheduleOptions::interval("tick", Duration::from_millis(100)),
            )
            .unwrap();
        scheduler.start();

        for _ in 0..4 {
            tokio::time::advance(Duration::from_millis(100)).await;
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
        }

        assert!(fired.load(Ordering::SeqCst) >= 3);
        let snapshot = scheduler.task(&id).unwrap();
        assert!(snapshot.run_count >= 3);
        assert_eq!(snapshot.error_count, 0);
        assert!(snapshot.last_run.is_some());
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_errors_counted_not_propagated() {
        let scheduler = scheduler();
        let id = scheduler
            .schedule(
                || async { Err(CoreError::execution("task", "boom")) },
                ScheduleOptions::interval("failing", Duration::from_millis(50)),
            )
            .unwrap();
        scheduler.start();

        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(50)).await;
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
        }

        let snapshot = scheduler.task(&id).unwrap();
        assert_eq!(snapshot.run_count, 0);
        assert!(snapshot.error_count >= 2);
        assert!(scheduler.is_running());
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_self_disables() {
        let scheduler = scheduler();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = scheduler
            .schedule(
                counting_task(fired.clone()),
                ScheduleOptions::interval("one-shot", Duration::from_millis(50)).run_once(),
            )
            .unwrap();
        scheduler.start();

        for _ in 0..4 {
            tokio::time::advance(Duration::from_millis(50)).await;
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
        }

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.task(&id).unwrap().enabled);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reenabled_run_once_task_fires_again() {
        let scheduler = scheduler();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = scheduler
            .schedule(
                counting_task(fired.clone()),
                ScheduleOptions::interval("one-shot", Duration::from_millis(50)).run_once(),
            )
            .unwrap();
        scheduler.start();

        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(50)).await;
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.task(&id).unwrap().enabled);

        // Re-enabling resumes ticking even though the previous driver exited.
        scheduler.enable(&id).unwrap();
        for _ in 0..3 {
            tokio::time::advance(Duration::from_millis(50)).await;
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert!(!scheduler.task(&id).unwrap().enabled);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_enable_remove() {
        let scheduler = scheduler();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = scheduler
            .schedule(
                counting_task(fired.clone()),
                ScheduleOptions::interval("toggled", Duration::from_millis(50)),
            )
            .unwrap();
        scheduler.start();

        scheduler.disable(&id).unwrap();
        tokio::time::advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        scheduler.enable(&id).unwrap();
        // Let the respawned driver register its sleep before moving the clock.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(fired.load(Ordering::SeqCst) >= 1);

        scheduler.remove(&id).unwrap();
        assert!(scheduler.task(&id).is_none());
        assert!(matches!(
            scheduler.disable(&id),
            Err(CoreError::NotFound { .. })
        ));
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_run_now_bypasses_timer() {
        let scheduler = scheduler();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = scheduler
            .schedule(
                counting_task(fired.clone()),
                ScheduleOptions::interval("manual", Duration::from_secs(3600)),
            )
            .unwrap();

        // Scheduler not even started.
        scheduler.run_now(&id).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.task(&id).unwrap().run_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_fires_on_start() {
        let scheduler = scheduler();
        let fired = Arc::new(AtomicUsize::new(0));
        scheduler
            .schedule(
                counting_task(fired.clone()),
                ScheduleOptions::interval("eager", Duration::from_secs(3600)).immediate(),
            )
            .unwrap();
        scheduler.start();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_retains_state() {
        let scheduler = scheduler();
        let id = scheduler
            .schedule(
                || async { Ok(()) },
                ScheduleOptions::interval("kept", Duration::from_millis(50)),
            )
            .unwrap();
        scheduler.start();
        // Let the spawned driver register its sleep before moving the clock.
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        scheduler.stop();

        let snapshot = scheduler.task(&id).unwrap();
        assert!(snapshot.run_count >= 1);
        assert!(snapshot.next_run.is_none());
    }
}
