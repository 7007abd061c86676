//! Per-execution state.
//!
//! Each `execute` call owns a fresh [`FlowExecutionContext`]; concurrent
//! executions of the same flow never share one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Lifecycle of one flow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Outcome of one node visit.
#[derive(Debug, Clone, Serialize)]
pub struct NodeExecutionResult {
    pub node_id: String,
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl NodeExecutionResult {
    pub fn ok(node_id: impl Into<String>, output: Value, started_at: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            node_id: node_id.into(),
            success: true,
            output: Some(output),
            error: None,
            started_at,
            duration,
        }
    }

    pub fn failed(
        node_id: impl Into<String>,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            success: false,
            output: None,
            error: Some(error.into()),
            started_at,
            duration,
        }
    }
}

/// Cooperative cancellation flag for one execution. In-progress node work
/// is not forcibly aborted; the traversal checks the flag before each node.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Mutable state of one execution, owned exclusively by that run.
#[derive(Debug, Clone, Serialize)]
pub struct FlowExecutionContext {
    pub execution_id: String,
    pub flow_id: String,
    pub status: ExecutionStatus,
    /// Working variables: trigger input merged over the flow's declared
    /// variables, plus per-node outputs keyed by node id.
    pub variables: Value,
    pub node_results: HashMap<String, NodeExecutionResult>,
    pub current_node_id: Option<String>,
    /// Value exported by the `output` node, when one was reached.
    pub output: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl FlowExecutionContext {
    pub fn new(flow_id: impl Into<String>, variables: Map<String, Value>) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            flow_id: flow_id.into(),
            status: ExecutionStatus::Pending,
            variables: Value::Object(variables),
            node_results: HashMap::new(),
            current_node_id: None,
            output: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn set_variable(&mut self, key: &str, value: Value) {
        if let Value::Object(map) = &mut self.variables {
            map.insert(key.to_string(), value);
        }
    }

    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.variables.as_object().and_then(|map| map.get(key))
    }

    pub fn record(&mut self, result: NodeExecutionResult) {
        self.node_results.insert(result.node_id.clone(), result);
    }

    pub(crate) fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.current_node_id = None;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_terminality() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Paused.is_terminal());
    }

    #[test]
    fn test_variables_and_results() {
        let mut ctx = FlowExecutionContext::new("f", Map::new());
        ctx.set_variable("price", json!(42));
        assert_eq!(ctx.variable("price"), Some(&json!(42)));

        ctx.record(NodeExecutionResult::ok(
            "n1",
            json!({"done": true}),
            Utc::now(),
            Duration::from_millis(3),
        ));
        assert!(ctx.node_results["n1"].success);

        ctx.finish(ExecutionStatus::Completed);
        assert!(ctx.finished_at.is_some());
        assert!(ctx.current_node_id.is_none());
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
