//! # Flowcore — Orchestration Substrate for a Pluggable Automation Runtime
//!
//! `flowcore` is the core of a plugin-driven automation terminal: a runtime
//! that loads capability modules, exposes their operations through typed
//! registries, reacts to lifecycle events, schedules recurring work, and
//! executes user-authored workflow graphs. It provides:
//!
//! - **Plugin system**: compile-time-checked [`plugin::Plugin`] contracts,
//!   dependency-ordered activation, and bulk teardown of everything a
//!   plugin registered.
//! - **Service registry**: named [`plugin::Action`] / [`plugin::Provider`] /
//!   [`plugin::Evaluator`] capabilities keyed by owning plugin.
//! - **Hook dispatcher**: priority-ordered event hooks with per-handler
//!   filters, timeouts, `once` semantics and error isolation.
//! - **Lifecycle state machine**: a fixed transition table with bounded
//!   history for diagnostics.
//! - **Async operation runner**: timeout, retry, single-flight
//!   de-duplication, and parallel / sequential / concurrency-limited
//!   batch execution.
//! - **Scheduler**: interval and restricted-cron recurring tasks.
//! - **Flow engine**: typed node/edge graphs (triggers, actions,
//!   conditions, loops, delays, subflows, outputs) executed depth-first
//!   with conditional edges and per-node retry/timeout.
//! - **TTL cache**: time-boxed key/value store with single-flight
//!   `get_or_set` and FIFO overflow eviction.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use flowcore::{Runtime, RuntimeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), flowcore::CoreError> {
//!     let mut runtime = Runtime::builder()
//!         .with_config(RuntimeConfig::default())
//!         .build();
//!     runtime.initialize().await?;
//!     runtime.start().await?;
//!     // ... schedule tasks, execute flows ...
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod flow;
pub mod hooks;
pub mod plugin;
pub mod registry;
pub mod runner;
pub mod runtime;
pub mod scheduler;
pub mod state;

pub use crate::cache::{CacheConfig, TtlCache};
pub use crate::config::{ChainConfig, LogLevel, RuntimeConfig};
pub use crate::error::CoreError;
pub use crate::events::{EventKind, RuntimeEvent};
pub use crate::flow::{
    CancelFlag, ConditionOperator, ExecutionStatus, Flow, FlowCondition, FlowEdge, FlowEngine,
    FlowExecutionContext, FlowNode, FlowStore, InMemoryFlowStore, NodeType,
};
pub use crate::hooks::{EmitOptions, Hook, HookDispatcher, HookOutcome, HookRegistration, HookStatus};
pub use crate::plugin::{
    Action, ActionResult, CapabilityContext, Evaluator, LoadReport, Plugin, PluginContext,
    PluginManager, PluginMetadata, PluginSource, Provider, ProviderResult,
};
pub use crate::registry::ServiceRegistry;
pub use crate::runner::{AsyncOperation, OperationRunner, RetryPolicy, RunnerDefaults};
pub use crate::runtime::{Runtime, RuntimeBuilder};
pub use crate::scheduler::{ScheduleOptions, Scheduler, TaskSnapshot};
pub use crate::state::{RuntimeState, StateMachine, Transition};
