//! Runtime events as a tagged union.
//!
//! Every event kind carries its own typed payload and is dispatched through
//! a single [`crate::hooks::HookDispatcher::emit`] entry point. Hooks
//! subscribe per [`EventKind`], the fieldless discriminant of the union.

use serde::Serialize;
use serde_json::Value;

use crate::flow::ExecutionStatus;
use crate::state::RuntimeState;

/// An event emitted by the runtime or one of its components.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RuntimeEvent {
    RuntimeInitialized,
    RuntimeStarted,
    RuntimeStopped,
    RuntimeShutdown,
    StateChanged {
        from: RuntimeState,
        to: RuntimeState,
    },
    PluginLoaded {
        name: String,
        version: String,
    },
    PluginUnloaded {
        name: String,
    },
    TaskScheduled {
        task_id: String,
        name: String,
    },
    TaskCompleted {
        task_id: String,
        run_count: u64,
    },
    TaskFailed {
        task_id: String,
        error: String,
    },
    FlowStarted {
        flow_id: String,
        execution_id: String,
    },
    FlowFinished {
        flow_id: String,
        execution_id: String,
        status: ExecutionStatus,
    },
    NodeExecuted {
        execution_id: String,
        node_id: String,
        success: bool,
    },
    /// Escape hatch for collaborator-defined events.
    Custom {
        name: String,
        data: Value,
    },
}

/// Discriminant of [`RuntimeEvent`], used as the hook registration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RuntimeInitialized,
    RuntimeStarted,
    RuntimeStopped,
    RuntimeShutdown,
    StateChanged,
    PluginLoaded,
    PluginUnloaded,
    TaskScheduled,
    TaskCompleted,
    TaskFailed,
    FlowStarted,
    FlowFinished,
    NodeExecuted,
    Custom,
}

impl RuntimeEvent {
    /// The discriminant this event dispatches under.
    pub fn kind(&self) -> EventKind {
        match self {
            RuntimeEvent::RuntimeInitialized => EventKind::RuntimeInitialized,
            RuntimeEvent::RuntimeStarted => EventKind::RuntimeStarted,
            RuntimeEvent::RuntimeStopped => EventKind::RuntimeStopped,
            RuntimeEvent::RuntimeShutdown => EventKind::RuntimeShutdown,
            RuntimeEvent::StateChanged { .. } => EventKind::StateChanged,
            RuntimeEvent::PluginLoaded { .. } => EventKind::PluginLoaded,
            RuntimeEvent::PluginUnloaded { .. } => EventKind::PluginUnloaded,
            RuntimeEvent::TaskScheduled { .. } => EventKind::TaskScheduled,
            RuntimeEvent::TaskCompleted { .. } => EventKind::TaskCompleted,
            RuntimeEvent::TaskFailed { .. } => EventKind::TaskFailed,
            RuntimeEvent::FlowStarted { .. } => EventKind::FlowStarted,
            RuntimeEvent::FlowFinished { .. } => EventKind::FlowFinished,
            RuntimeEvent::NodeExecuted { .. } => EventKind::NodeExecuted,
            RuntimeEvent::Custom { .. } => EventKind::Custom,
        }
    }

    /// The event payload as JSON, for hooks that inspect events generically.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
