//! Flow persistence seam.
//!
//! The engine does not persist anything itself; an external collaborator
//! implements [`FlowStore`] over whatever storage it likes. The in-memory
//! implementation here backs tests and single-process deployments, and
//! doubles as the [`SubflowResolver`] for its own flows.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::context::FlowExecutionContext;
use super::engine::{FlowEngine, SubflowResolver};
use super::schema::Flow;
use crate::error::CoreError;

/// CRUD plus execution over persisted flow definitions.
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn create(&self, flow: Flow) -> Result<(), CoreError>;
    async fn get(&self, flow_id: &str) -> Result<Flow, CoreError>;
    async fn update(&self, flow: Flow) -> Result<(), CoreError>;
    async fn delete(&self, flow_id: &str) -> Result<(), CoreError>;
    async fn get_all(&self) -> Result<Vec<Flow>, CoreError>;
    /// Execute a stored flow and retain its execution record.
    async fn execute(&self, flow_id: &str, input: Value) -> Result<FlowExecutionContext, CoreError>;
    async fn get_execution(&self, execution_id: &str) -> Result<FlowExecutionContext, CoreError>;
    async fn validate(&self, flow: &Flow) -> Result<(), CoreError>;
}

#[derive(Default)]
struct Catalog {
    flows: RwLock<HashMap<String, Flow>>,
}

impl SubflowResolver for Catalog {
    fn resolve(&self, flow_id: &str) -> Option<Flow> {
        self.flows.read().get(flow_id).cloned()
    }
}

/// Process-local [`FlowStore`].
pub struct InMemoryFlowStore {
    catalog: Arc<Catalog>,
    executions: RwLock<HashMap<String, FlowExecutionContext>>,
    engine: FlowEngine,
}

impl InMemoryFlowStore {
    /// Wire the store's own catalog in as the engine's subflow resolver.
    pub fn new(engine: FlowEngine) -> Self {
        let catalog = Arc::new(Catalog::default());
        Self {
            engine: engine.with_resolver(catalog.clone()),
            catalog,
            executions: RwLock::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &FlowEngine {
        &self.engine
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn create(&self, flow: Flow) -> Result<(), CoreError> {
        self.engine.validate(&flow)?;
        let mut flows = self.catalog.flows.write();
        if flows.contains_key(&flow.id) {
            return Err(CoreError::Validation(format!(
                "flow '{}' already exists",
                flow.id
            )));
        }
        flows.insert(flow.id.clone(), flow);
        Ok(())
    }

    async fn get(&self, flow_id: &str) -> Result<Flow, CoreError> {
        self.catalog
            .flows
            .read()
            .get(flow_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("flow", flow_id))
    }

    async fn update(&self, flow: Flow) -> Result<(), CoreError> {
        self.engine.validate(&flow)?;
        let mut flows = self.catalog.flows.write();
        if !flows.contains_key(&flow.id) {
            return Err(CoreError::not_found("flow", &flow.id));
        }
        flows.insert(flow.id.clone(), flow);
        Ok(())
    }

    async fn delete(&self, flow_id: &str) -> Result<(), CoreError> {
        self.catalog
            .flows
            .write()
            .remove(flow_id)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("flow", flow_id))
    }

    async fn get_all(&self) -> Result<Vec<Flow>, CoreError> {
        Ok(self.catalog.flows.read().values().cloned().collect())
    }

    async fn execute(&self, flow_id: &str, input: Value) -> Result<FlowExecutionContext, CoreError> {
        let flow = self.get(flow_id).await?;
        let ctx = self.engine.execute(&flow, input).await?;
        self.executions
            .write()
            .insert(ctx.execution_id.clone(), ctx.clone());
        Ok(ctx)
    }

    async fn get_execution(&self, execution_id: &str) -> Result<FlowExecutionContext, CoreError> {
        self.executions
            .read()
            .get(execution_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("execution", execution_id))
    }

    async fn validate(&self, flow: &Flow) -> Result<(), CoreError> {
        self.engine.validate(flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::context::ExecutionStatus;
    use crate::flow::schema::{FlowEdge, FlowNode, NodeType};
    use crate::registry::ServiceRegistry;
    use crate::runner::{OperationRunner, RunnerDefaults};
    use serde_json::json;

    fn store() -> InMemoryFlowStore {
        let engine = FlowEngine::new(
            ServiceRegistry::new(),
            OperationRunner::new(RunnerDefaults::default()),
        );
        InMemoryFlowStore::new(engine)
    }

    fn trivial_flow(id: &str) -> Flow {
        let mut flow = Flow::new(id);
        flow.nodes = vec![
            FlowNode::new("start", NodeType::Trigger),
            FlowNode::new("end", NodeType::Output),
        ];
        flow.edges = vec![FlowEdge::new("e1", "start", "end")];
        flow
    }

    #[tokio::test]
    async fn test_crud_lifecycle() {
        let store = store();
        store.create(trivial_flow("f1")).await.unwrap();
        store.create(trivial_flow("f2")).await.unwrap();

        assert!(matches!(
            store.create(trivial_flow("f1")).await,
            Err(CoreError::Validation(_))
        ));
        assert_eq!(store.get_all().await.unwrap().len(), 2);

        let mut updated = trivial_flow("f1");
        updated.name = "renamed".into();
        store.update(updated).await.unwrap();
        assert_eq!(store.get("f1").await.unwrap().name, "renamed");

        assert!(matches!(
            store.update(trivial_flow("ghost")).await,
            Err(CoreError::NotFound { .. })
        ));

        store.delete("f1").await.unwrap();
        assert!(matches!(
            store.get("f1").await,
            Err(CoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_flow() {
        let store = store();
        let invalid = Flow::new("broken");
        assert!(matches!(
            store.create(invalid).await,
            Err(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_records_execution() {
        let store = store();
        store.create(trivial_flow("f1")).await.unwrap();

        let ctx = store.execute("f1", json!({"k": 1})).await.unwrap();
        assert_eq!(ctx.status, ExecutionStatus::Completed);

        let recorded = store.get_execution(&ctx.execution_id).await.unwrap();
        assert_eq!(recorded.flow_id, "f1");
        assert_eq!(recorded.status, ExecutionStatus::Completed);

        assert!(matches!(
            store.get_execution("nope").await,
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.execute("ghost", json!({})).await,
            Err(CoreError::NotFound { .. })
        ));
    }
}
