//! Flow graph model, validation and execution.

pub mod condition;
pub mod context;
pub mod engine;
pub mod schema;
pub mod store;

pub use condition::{ConditionOperator, FlowCondition};
pub use context::{CancelFlag, ExecutionStatus, FlowExecutionContext, NodeExecutionResult};
pub use engine::{FlowEngine, SubflowResolver};
pub use schema::{
    ActionNodeData, ConditionNodeData, DelayNodeData, EdgeKind, Flow, FlowEdge, FlowNode,
    FlowSettings, LoopNodeData, NodeType, OutputNodeData, Position, SubflowNodeData,
};
pub use store::{FlowStore, InMemoryFlowStore};
