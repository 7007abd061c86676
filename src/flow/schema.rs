//! Flow definition data model.
//!
//! Flows are data: a versioned node/edge graph authored externally and
//! persisted by a [`super::store::FlowStore`] collaborator. The engine only
//! sees these types after deserialization. Wire format is camelCase JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::condition::FlowCondition;
use crate::error::CoreError;

/// Node variants understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Trigger,
    Action,
    Condition,
    Loop,
    Delay,
    Subflow,
    Output,
}

impl NodeType {
    /// Output handles this node type may route through. The port contract
    /// is fixed per type; validation rejects edges outside it.
    pub fn output_handles(&self) -> &'static [&'static str] {
        match self {
            NodeType::Trigger | NodeType::Delay => &["output"],
            NodeType::Action | NodeType::Subflow => &["output", "error"],
            NodeType::Condition => &["true", "false"],
            NodeType::Loop => &["iteration", "complete"],
            NodeType::Output => &[],
        }
    }

    pub fn takes_input(&self) -> bool {
        !matches!(self, NodeType::Trigger)
    }
}

/// Canvas position. UI-only; execution ignores it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: Position,
    /// Type-specific payload; decoded on demand via the `*NodeData` structs.
    #[serde(default)]
    pub data: Value,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            name: String::new(),
            position: Position::default(),
            data: Value::Null,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// Decode this node's `data` payload into its typed form.
    pub fn decode<T: serde::de::DeserializeOwned + Default>(&self) -> Result<T, CoreError> {
        if self.data.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.data.clone()).map_err(|err| {
            CoreError::Validation(format!("node '{}' has malformed data: {err}", self.id))
        })
    }
}

/// Payload of an `action` node: either a registered action to invoke or a
/// registered provider to fetch from, never both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionNodeData {
    /// Registered action name to invoke.
    #[serde(default)]
    pub action: String,
    /// Registered provider name to fetch from instead.
    #[serde(default)]
    pub provider: Option<String>,
    /// Literal input forwarded to the action or provider.
    #[serde(default)]
    pub input: Value,
}

/// Payload of a `condition` node. Either an inline condition or the name of
/// a registered evaluator; the inline condition wins when both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionNodeData {
    #[serde(default)]
    pub condition: Option<FlowCondition>,
    #[serde(default)]
    pub evaluator: Option<String>,
    #[serde(default)]
    pub input: Value,
}

/// Payload of a `loop` node. Iterates a literal item list, the array found
/// at `over` in the execution variables, or a plain count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopNodeData {
    #[serde(default)]
    pub items: Option<Vec<Value>>,
    #[serde(default)]
    pub over: Option<String>,
    #[serde(default)]
    pub count: Option<u64>,
}

/// Payload of a `delay` node: a fixed duration, or a bounded-random one
/// when `max_ms` is present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayNodeData {
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub max_ms: Option<u64>,
}

/// Payload of a `subflow` node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubflowNodeData {
    pub flow_id: String,
}

/// Payload of an `output` node. When `variable` is set only that variable
/// is exported; otherwise the whole variable map is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputNodeData {
    #[serde(default)]
    pub variable: Option<String>,
}

/// Edge variants. `Conditional` edges additionally carry a [`FlowCondition`]
/// gating traversal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    #[default]
    Default,
    Success,
    Failure,
    Conditional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Which output port of the source this edge leaves from. Unset means
    /// the node's normal-completion port.
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: EdgeKind,
    #[serde(default)]
    pub condition: Option<FlowCondition>,
}

impl FlowEdge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            kind: EdgeKind::Default,
            condition: None,
        }
    }

    pub fn from_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn with_kind(mut self, kind: EdgeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_condition(mut self, condition: FlowCondition) -> Self {
        self.kind = EdgeKind::Conditional;
        self.condition = Some(condition);
        self
    }

    /// The source-port name this edge effectively listens on: an explicit
    /// `sourceHandle` wins, otherwise `success`/`failure` typing maps to
    /// `output`/`error`, and plain edges default to `output`.
    pub fn effective_handle(&self) -> &str {
        if let Some(handle) = &self.source_handle {
            return handle;
        }
        match self.kind {
            EdgeKind::Failure => "error",
            _ => "output",
        }
    }
}

/// Per-flow execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowSettings {
    /// Wall-clock budget for one execution, checked at node boundaries.
    pub max_execution_time_ms: Option<u64>,
    /// Retry failing action/subflow nodes.
    pub retry_on_failure: bool,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Upper bound on node visits, guarding against runaway loops.
    pub max_steps: u32,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            max_execution_time_ms: None,
            retry_on_failure: false,
            max_retries: 3,
            retry_delay_ms: 0,
            max_steps: 1_000,
        }
    }
}

/// A complete flow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
    /// Initial execution variables, merged under the trigger input.
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub settings: FlowSettings,
}

fn default_version() -> u32 {
    1
}

impl Flow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            version: 1,
            nodes: Vec::new(),
            edges: Vec::new(),
            variables: HashMap::new(),
            settings: FlowSettings::default(),
        }
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn trigger_nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Trigger)
    }

    /// Outgoing edges of `node_id` listening on `handle`, in declaration
    /// order.
    pub fn edges_from<'f>(
        &'f self,
        node_id: &'f str,
        handle: &'f str,
    ) -> impl Iterator<Item = &'f FlowEdge> + 'f {
        self.edges
            .iter()
            .filter(move |e| e.source == node_id && e.effective_handle() == handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flow_round_trips_camel_case() {
        let raw = json!({
            "id": "f1",
            "name": "demo",
            "nodes": [
                {"id": "t", "type": "trigger"},
                {"id": "a", "type": "action", "data": {"action": "send", "input": {"to": "x"}}}
            ],
            "edges": [
                {"id": "e1", "source": "t", "target": "a", "sourceHandle": "output"}
            ],
            "settings": {"retryOnFailure": true, "maxRetries": 2}
        });
        let flow: Flow = serde_json::from_value(raw).unwrap();
        assert_eq!(flow.version, 1);
        assert_eq!(flow.nodes[1].node_type, NodeType::Action);
        assert!(flow.settings.retry_on_failure);
        assert_eq!(flow.settings.max_retries, 2);

        let data: ActionNodeData = flow.nodes[1].decode().unwrap();
        assert_eq!(data.action, "send");
        assert_eq!(data.input["to"], "x");
    }

    #[test]
    fn test_effective_handle_mapping() {
        let plain = FlowEdge::new("e", "a", "b");
        assert_eq!(plain.effective_handle(), "output");

        let failure = FlowEdge::new("e", "a", "b").with_kind(EdgeKind::Failure);
        assert_eq!(failure.effective_handle(), "error");

        let explicit = FlowEdge::new("e", "a", "b").from_handle("false");
        assert_eq!(explicit.effective_handle(), "false");

        let success = FlowEdge::new("e", "a", "b").with_kind(EdgeKind::Success);
        assert_eq!(success.effective_handle(), "output");
    }

    #[test]
    fn test_port_contracts() {
        assert_eq!(NodeType::Trigger.output_handles(), &["output"]);
        assert_eq!(NodeType::Action.output_handles(), &["output", "error"]);
        assert_eq!(NodeType::Condition.output_handles(), &["true", "false"]);
        assert_eq!(NodeType::Loop.output_handles(), &["iteration", "complete"]);
        assert!(NodeType::Output.output_handles().is_empty());
        assert!(!NodeType::Trigger.takes_input());
        assert!(NodeType::Output.takes_input());
    }

    #[test]
    fn test_decode_rejects_malformed_data() {
        let node = FlowNode::new("d", NodeType::Delay).with_data(json!({"durationMs": "soon"}));
        assert!(node.decode::<DelayNodeData>().is_err());

        let empty = FlowNode::new("d", NodeType::Delay);
        let data: DelayNodeData = empty.decode().unwrap();
        assert_eq!(data.duration_ms, 0);
    }
}
