//! Flow graph validation and execution.
//!
//! Traversal is depth-first from the trigger node(s). After each node the
//! engine follows the outgoing edge whose source port matches the node's
//! result: normal completion takes `output` (or a `success`-typed edge),
//! failure takes `error` (or `failure`-typed), conditions take
//! `true`/`false`, loops take `iteration` per item and `complete` when
//! exhausted. `conditional`-typed edges are additionally gated by their
//! [`FlowCondition`] against the current variables.
//!
//! Action nodes invoke a registered action or fetch from a registered
//! provider; either way they run through the [`OperationRunner`], so the
//! flow's retry settings and remaining time budget apply per node. A node
//! failure with no `error` edge fails the execution; reaching an `output`
//! node (or a dead end after a successful node) completes it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use rand::Rng;
use serde_json::{json, Map, Value};
use tokio::time::Instant;

use super::context::{CancelFlag, ExecutionStatus, FlowExecutionContext, NodeExecutionResult};
use super::schema::{
    ActionNodeData, ConditionNodeData, DelayNodeData, EdgeKind, Flow, FlowEdge, FlowNode,
    LoopNodeData, NodeType, OutputNodeData, SubflowNodeData,
};
use crate::error::CoreError;
use crate::events::RuntimeEvent;
use crate::hooks::{EmitOptions, HookDispatcher};
use crate::plugin::CapabilityContext;
use crate::registry::ServiceRegistry;
use crate::runner::{AsyncOperation, OperationRunner, RetryPolicy};

/// Nesting bound for subflow nodes.
const MAX_SUBFLOW_DEPTH: usize = 8;

/// Resolves subflow references to their definitions. Implemented by the
/// flow store.
pub trait SubflowResolver: Send + Sync {
    fn resolve(&self, flow_id: &str) -> Option<Flow>;
}

/// Executes flow definitions against the service registry.
#[derive(Clone)]
pub struct FlowEngine {
    registry: ServiceRegistry,
    runner: OperationRunner,
    dispatcher: Option<HookDispatcher>,
    resolver: Option<Arc<dyn SubflowResolver>>,
}

impl FlowEngine {
    pub fn new(registry: ServiceRegistry, runner: OperationRunner) -> Self {
        Self {
            registry,
            runner,
            dispatcher: None,
            resolver: None,
        }
    }

    /// Emit flow lifecycle events through the given dispatcher.
    pub fn with_dispatcher(mut self, dispatcher: HookDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Enable `subflow` nodes by providing a definition resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn SubflowResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Structural validation: port contracts, edge endpoints, node payloads.
    pub fn validate(&self, flow: &Flow) -> Result<(), CoreError> {
        if flow.id.trim().is_empty() {
            return Err(CoreError::Validation("flow id must not be empty".into()));
        }
        if flow.trigger_nodes().next().is_none() {
            return Err(CoreError::Validation(format!(
                "flow '{}' has no trigger node",
                flow.id
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for node in &flow.nodes {
            if node.id.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "flow '{}' contains a node with an empty id",
                    flow.id
                )));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(CoreError::Validation(format!(
                    "flow '{}' has duplicate node id '{}'",
                    flow.id, node.id
                )));
            }
            self.validate_node_data(flow, node)?;
        }

        for edge in &flow.edges {
            let source = flow.node(&edge.source).ok_or_else(|| {
                CoreError::Validation(format!(
                    "edge '{}' references unknown source node '{}'",
                    edge.id, edge.source
                ))
            })?;
            let target = flow.node(&edge.target).ok_or_else(|| {
                CoreError::Validation(format!(
                    "edge '{}' references unknown target node '{}'",
                    edge.id, edge.target
                ))
            })?;
            if !target.node_type.takes_input() {
                return Err(CoreError::Validation(format!(
                    "edge '{}' targets trigger node '{}', which accepts no input",
                    edge.id, target.id
                )));
            }
            let handle = edge.effective_handle();
            if !source.node_type.output_handles().contains(&handle) {
                return Err(CoreError::Validation(format!(
                    "edge '{}' leaves node '{}' through port '{}', which a {:?} node does not have",
                    edge.id, source.id, handle, source.node_type
                )));
            }
            if edge.kind == EdgeKind::Conditional && edge.condition.is_none() {
                return Err(CoreError::Validation(format!(
                    "conditional edge '{}' is missing its condition",
                    edge.id
                )));
            }
        }
        Ok(())
    }

    fn validate_node_data(&self, flow: &Flow, node: &FlowNode) -> Result<(), CoreError> {
        match node.node_type {
            NodeType::Action => {
                let data: ActionNodeData = node.decode()?;
                match (data.action.trim().is_empty(), &data.provider) {
                    (true, None) => {
                        return Err(CoreError::Validation(format!(
                            "action node '{}' names neither an action nor a provider",
                            node.id
                        )))
                    }
                    (false, Some(_)) => {
                        return Err(CoreError::Validation(format!(
                            "action node '{}' names both an action and a provider",
                            node.id
                        )))
                    }
                    _ => {}
                }
            }
            NodeType::Condition => {
                let data: ConditionNodeData = node.decode()?;
                if data.condition.is_none() && data.evaluator.is_none() {
                    return Err(CoreError::Validation(format!(
                        "condition node '{}' has neither a condition nor an evaluator",
                        node.id
                    )));
                }
            }
            NodeType::Subflow => {
                let data: SubflowNodeData = node.decode()?;
                if data.flow_id.trim().is_empty() {
                    return Err(CoreError::Validation(format!(
                        "subflow node '{}' names no flow",
                        node.id
                    )));
                }
                if self.resolver.is_none() {
                    return Err(CoreError::Validation(format!(
                        "flow '{}' uses subflow nodes but no resolver is configured",
                        flow.id
                    )));
                }
            }
            NodeType::Delay => {
                let data: DelayNodeData = node.decode()?;
                if let Some(max) = data.max_ms {
                    if max < data.duration_ms {
                        return Err(CoreError::Validation(format!(
                            "delay node '{}' has maxMs below durationMs",
                            node.id
                        )));
                    }
                }
            }
            NodeType::Trigger | NodeType::Loop | NodeType::Output => {}
        }
        Ok(())
    }

    /// Execute a flow to completion. The returned context carries the
    /// terminal status; an `Err` is only produced for invalid definitions.
    pub async fn execute(&self, flow: &Flow, input: Value) -> Result<FlowExecutionContext, CoreError> {
        self.execute_inner(flow, input, CancelFlag::new(), 0).await
    }

    /// As [`execute`](Self::execute), with an external cancellation flag.
    pub async fn execute_with_cancel(
        &self,
        flow: &Flow,
        input: Value,
        cancel: CancelFlag,
    ) -> Result<FlowExecutionContext, CoreError> {
        self.execute_inner(flow, input, cancel, 0).await
    }

    fn execute_inner<'a>(
        &'a self,
        flow: &'a Flow,
        input: Value,
        cancel: CancelFlag,
        depth: usize,
    ) -> BoxFuture<'a, Result<FlowExecutionContext, CoreError>> {
        async move {
            self.validate(flow)?;

            let mut variables: Map<String, Value> =
                flow.variables.clone().into_iter().collect();
            match input {
                Value::Object(map) => variables.extend(map),
                Value::Null => {}
                other => {
                    variables.insert("input".to_string(), other);
                }
            }

            let mut ctx = FlowExecutionContext::new(&flow.id, variables);
            ctx.status = ExecutionStatus::Running;
            self.emit(RuntimeEvent::FlowStarted {
                flow_id: flow.id.clone(),
                execution_id: ctx.execution_id.clone(),
            })
            .await;
            tracing::debug!(flow = %flow.id, execution = %ctx.execution_id, "flow execution started");

            let deadline = flow
                .settings
                .max_execution_time_ms
                .map(|ms| Instant::now() + Duration::from_millis(ms));
            let mut walk = Walk {
                engine: self,
                flow,
                cancel: &cancel,
                deadline,
                depth,
                steps: 0,
            };

            let trigger_ids: Vec<String> =
                flow.trigger_nodes().map(|n| n.id.clone()).collect();
            let mut halt = None;
            for trigger_id in trigger_ids {
                if let Err(reason) = walk.run(&mut ctx, trigger_id).await {
                    halt = Some(reason);
                    break;
                }
            }

            match halt {
                None => ctx.finish(ExecutionStatus::Completed),
                Some(Halt::Cancelled) => ctx.finish(ExecutionStatus::Cancelled),
                Some(Halt::Failed(error)) => {
                    ctx.error = Some(error);
                    ctx.finish(ExecutionStatus::Failed);
                }
            }
            tracing::debug!(
                flow = %flow.id,
                execution = %ctx.execution_id,
                status = ?ctx.status,
                "flow execution finished"
            );
            self.emit(RuntimeEvent::FlowFinished {
                flow_id: flow.id.clone(),
                execution_id: ctx.execution_id.clone(),
                status: ctx.status,
            })
            .await;
            Ok(ctx)
        }
        .boxed()
    }

    async fn emit(&self, event: RuntimeEvent) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.emit(event, EmitOptions::default()).await;
        }
    }
}

/// Why a traversal stopped short of normal completion.
enum Halt {
    Failed(String),
    Cancelled,
}

/// One depth-first traversal over a flow.
struct Walk<'a> {
    engine: &'a FlowEngine,
    flow: &'a Flow,
    cancel: &'a CancelFlag,
    deadline: Option<Instant>,
    depth: usize,
    steps: u32,
}

impl<'a> Walk<'a> {
    fn run<'w>(
        &'w mut self,
        ctx: &'w mut FlowExecutionContext,
        node_id: String,
    ) -> BoxFuture<'w, Result<(), Halt>> {
        async move {
            if self.cancel.is_cancelled() {
                return Err(Halt::Cancelled);
            }
            self.steps += 1;
            if self.steps > self.flow.settings.max_steps {
                return Err(Halt::Failed(format!(
                    "flow '{}' exceeded {} node visits",
                    self.flow.id, self.flow.settings.max_steps
                )));
            }
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    return Err(Halt::Failed(format!(
                        "flow '{}' exceeded its execution time budget",
                        self.flow.id
                    )));
                }
            }

            // Validation already established the node exists.
            let node = match self.flow.node(&node_id) {
                Some(node) => node.clone(),
                None => return Err(Halt::Failed(format!("unknown node '{node_id}'"))),
            };
            ctx.current_node_id = Some(node.id.clone());

            match node.node_type {
                // Triggers carry no work of their own; they just start the walk.
                NodeType::Trigger => self.follow(ctx, &node.id, "output").await,
                NodeType::Action => self.run_action(ctx, &node).await,
                NodeType::Condition => self.run_condition(ctx, &node).await,
                NodeType::Loop => self.run_loop(ctx, &node).await,
                NodeType::Delay => self.run_delay(ctx, &node).await,
                NodeType::Subflow => self.run_subflow(ctx, &node).await,
                NodeType::Output => self.run_output(ctx, &node).await,
            }
        }
        .boxed()
    }

    /// Follow the first matching outgoing edge on `handle`. A dead end is a
    /// normal completion of this branch.
    async fn follow(
        &mut self,
        ctx: &mut FlowExecutionContext,
        node_id: &str,
        handle: &str,
    ) -> Result<(), Halt> {
        let next = self.next_edge(ctx, node_id, handle).map(|e| e.target.clone());
        match next {
            Some(target) => self.run(ctx, target).await,
            None => Ok(()),
        }
    }

    fn next_edge<'f>(
        &'f self,
        ctx: &'f FlowExecutionContext,
        node_id: &'f str,
        handle: &'f str,
    ) -> Option<&'f FlowEdge> {
        self.flow.edges_from(node_id, handle).find(|edge| {
            match (edge.kind, &edge.condition) {
                (EdgeKind::Conditional, Some(condition)) => condition.evaluate(&ctx.variables),
                (EdgeKind::Conditional, None) => false,
                _ => true,
            }
        })
    }

    async fn run_action(
        &mut self,
        ctx: &mut FlowExecutionContext,
        node: &FlowNode,
    ) -> Result<(), Halt> {
        let data: ActionNodeData = match node.decode() {
            Ok(data) => data,
            Err(err) => return self.fail_node(ctx, node, err.to_string()).await,
        };
        let started_at = Utc::now();
        let t0 = std::time::Instant::now();

        let context = CapabilityContext {
            input: data.input.clone(),
            variables: ctx.variables.clone(),
        };
        let outcome = if let Some(name) = &data.provider {
            match self.engine.registry.provider(name) {
                None => Err(CoreError::not_found("provider", name)),
                Some(provider) => {
                    let operation = self.provider_operation(node, provider, context);
                    self.engine.runner.run(&operation).await
                }
            }
        } else {
            match self.engine.registry.action(&data.action) {
                None => Err(CoreError::not_found("action", &data.action)),
                Some(action) => match action.validate(&data.input) {
                    Err(err) => Err(err),
                    Ok(()) => {
                        let operation = self.node_operation(node, action, context);
                        self.engine.runner.run(&operation).await
                    }
                },
            }
        };

        match outcome {
            Ok(output) => {
                ctx.record(NodeExecutionResult::ok(
                    &node.id,
                    output.clone(),
                    started_at,
                    t0.elapsed(),
                ));
                self.notify(ctx, &node.id, true).await;
                ctx.set_variable(&node.id, output);
                self.follow(ctx, &node.id, "output").await
            }
            Err(err) => {
                let message = err.to_string();
                ctx.record(NodeExecutionResult::failed(
                    &node.id,
                    message.clone(),
                    started_at,
                    t0.elapsed(),
                ));
                self.notify(ctx, &node.id, false).await;
                tracing::warn!(flow = %self.flow.id, node = %node.id, error = %message, "action node failed");
                match self.next_edge(ctx, &node.id, "error").map(|e| e.target.clone()) {
                    Some(target) => {
                        ctx.set_variable(&node.id, json!({ "error": message }));
                        self.run(ctx, target).await
                    }
                    None => Err(Halt::Failed(message)),
                }
            }
        }
    }

    /// Wrap one node invocation in an [`AsyncOperation`] so the flow's
    /// retry settings and remaining time budget apply.
    fn node_operation(
        &self,
        node: &FlowNode,
        action: Arc<dyn crate::plugin::Action>,
        context: CapabilityContext,
    ) -> AsyncOperation {
        let name = format!("{}:{}", self.flow.id, node.id);
        let operation = AsyncOperation::new(name.clone(), move || {
            let action = action.clone();
            let context = context.clone();
            let name = name.clone();
            async move {
                let result = action.execute(&context).await?;
                if result.success {
                    Ok(result.data.unwrap_or(Value::Null))
                } else {
                    Err(CoreError::execution(
                        name,
                        result.error.unwrap_or_else(|| "action failed".into()),
                    ))
                }
            }
        });
        self.apply_flow_settings(operation)
    }

    /// As [`node_operation`](Self::node_operation), fetching from a provider.
    /// Cache-hinted providers come back from the registry already wrapped in
    /// their caching front, so repeat fetches hit the cache here.
    fn provider_operation(
        &self,
        node: &FlowNode,
        provider: Arc<dyn crate::plugin::Provider>,
        context: CapabilityContext,
    ) -> AsyncOperation {
        let name = format!("{}:{}", self.flow.id, node.id);
        let operation = AsyncOperation::new(name.clone(), move || {
            let provider = provider.clone();
            let context = context.clone();
            let name = name.clone();
            async move {
                let result = provider.get(&context).await?;
                if result.success {
                    Ok(result.data.unwrap_or(Value::Null))
                } else {
                    Err(CoreError::execution(
                        name,
                        result
                            .error
                            .unwrap_or_else(|| "provider fetch failed".into()),
                    ))
                }
            }
        });
        self.apply_flow_settings(operation)
    }

    fn apply_flow_settings(&self, mut operation: AsyncOperation) -> AsyncOperation {
        if let Some(deadline) = self.deadline {
            operation = operation.with_timeout(deadline.duration_since(Instant::now()));
        }
        if self.flow.settings.retry_on_failure {
            operation = operation.with_retry(RetryPolicy {
                max_attempts: self.flow.settings.max_retries + 1,
                delay: Duration::from_millis(self.flow.settings.retry_delay_ms),
            });
        }
        operation
    }

    async fn run_condition(
        &mut self,
        ctx: &mut FlowExecutionContext,
        node: &FlowNode,
    ) -> Result<(), Halt> {
        let data: ConditionNodeData = match node.decode() {
            Ok(data) => data,
            Err(err) => return self.fail_node(ctx, node, err.to_string()).await,
        };
        let started_at = Utc::now();
        let t0 = std::time::Instant::now();

        let verdict: Result<bool, CoreError> = if let Some(condition) = &data.condition {
            Ok(condition.evaluate(&ctx.variables))
        } else if let Some(name) = &data.evaluator {
            match self.engine.registry.evaluator(name) {
                None => Err(CoreError::not_found("evaluator", name)),
                Some(evaluator) => {
                    let context = CapabilityContext {
                        input: data.input.clone(),
                        variables: ctx.variables.clone(),
                    };
                    evaluator.evaluate(&context).await
                }
            }
        } else {
            Err(CoreError::Validation(format!(
                "condition node '{}' has nothing to evaluate",
                node.id
            )))
        };

        match verdict {
            Ok(result) => {
                ctx.record(NodeExecutionResult::ok(
                    &node.id,
                    json!(result),
                    started_at,
                    t0.elapsed(),
                ));
                self.notify(ctx, &node.id, true).await;
                let handle = if result { "true" } else { "false" };
                self.follow(ctx, &node.id, handle).await
            }
            Err(err) => {
                // Conditions have no error port; failure ends the execution.
                ctx.record(NodeExecutionResult::failed(
                    &node.id,
                    err.to_string(),
                    started_at,
                    t0.elapsed(),
                ));
                self.notify(ctx, &node.id, false).await;
                Err(Halt::Failed(err.to_string()))
            }
        }
    }

    async fn run_loop(
        &mut self,
        ctx: &mut FlowExecutionContext,
        node: &FlowNode,
    ) -> Result<(), Halt> {
        let data: LoopNodeData = match node.decode() {
            Ok(data) => data,
            Err(err) => return self.fail_node(ctx, node, err.to_string()).await,
        };
        let started_at = Utc::now();
        let t0 = std::time::Instant::now();

        let items: Vec<Value> = if let Some(items) = data.items {
            items
        } else if let Some(path) = &data.over {
            match ctx.variable(path) {
                Some(Value::Array(items)) => items.clone(),
                _ => {
                    return self
                        .fail_node(
                            ctx,
                            node,
                            format!("loop node '{}' found no array at '{path}'", node.id),
                        )
                        .await
                }
            }
        } else {
            (0..data.count.unwrap_or(0)).map(|i| json!(i)).collect()
        };

        let body = self
            .next_edge(ctx, &node.id, "iteration")
            .map(|e| e.target.clone());
        let total = items.len();
        if let Some(target) = body {
            for (index, item) in items.into_iter().enumerate() {
                ctx.set_variable("item", item);
                ctx.set_variable("index", json!(index));
                self.run(ctx, target.clone()).await?;
            }
        }

        ctx.record(NodeExecutionResult::ok(
            &node.id,
            json!({ "iterations": total }),
            started_at,
            t0.elapsed(),
        ));
        self.notify(ctx, &node.id, true).await;
        self.follow(ctx, &node.id, "complete").await
    }

    async fn run_delay(
        &mut self,
        ctx: &mut FlowExecutionContext,
        node: &FlowNode,
    ) -> Result<(), Halt> {
        let data: DelayNodeData = match node.decode() {
            Ok(data) => data,
            Err(err) => return self.fail_node(ctx, node, err.to_string()).await,
        };
        let started_at = Utc::now();
        let t0 = std::time::Instant::now();

        let millis = match data.max_ms {
            Some(max) if max > data.duration_ms => {
                rand::thread_rng().gen_range(data.duration_ms..=max)
            }
            _ => data.duration_ms,
        };
        // Suspends only this execution; concurrent flows keep running.
        tokio::time::sleep(Duration::from_millis(millis)).await;
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }

        ctx.record(NodeExecutionResult::ok(
            &node.id,
            json!({ "delayedMs": millis }),
            started_at,
            t0.elapsed(),
        ));
        self.notify(ctx, &node.id, true).await;
        self.follow(ctx, &node.id, "output").await
    }

    async fn run_subflow(
        &mut self,
        ctx: &mut FlowExecutionContext,
        node: &FlowNode,
    ) -> Result<(), Halt> {
        let data: SubflowNodeData = match node.decode() {
            Ok(data) => data,
            Err(err) => return self.fail_node(ctx, node, err.to_string()).await,
        };
        let started_at = Utc::now();
        let t0 = std::time::Instant::now();

        let outcome: Result<Value, String> = if self.depth + 1 >= MAX_SUBFLOW_DEPTH {
            Err(format!(
                "subflow nesting exceeds {MAX_SUBFLOW_DEPTH} levels at node '{}'",
                node.id
            ))
        } else {
            let child = self
                .engine
                .resolver
                .as_ref()
                .and_then(|r| r.resolve(&data.flow_id));
            match child {
                None => Err(format!("subflow '{}' not found", data.flow_id)),
                Some(child) => {
                    let result = self
                        .engine
                        .execute_inner(
                            &child,
                            ctx.variables.clone(),
                            self.cancel.clone(),
                            self.depth + 1,
                        )
                        .await;
                    match result {
                        Err(err) => Err(err.to_string()),
                        Ok(child_ctx) if child_ctx.status == ExecutionStatus::Cancelled => {
                            return Err(Halt::Cancelled)
                        }
                        Ok(child_ctx) if child_ctx.status == ExecutionStatus::Completed => {
                            Ok(child_ctx
                                .output
                                .unwrap_or_else(|| child_ctx.variables.clone()))
                        }
                        Ok(child_ctx) => Err(child_ctx
                            .error
                            .unwrap_or_else(|| format!("subflow '{}' failed", data.flow_id))),
                    }
                }
            }
        };

        match outcome {
            Ok(output) => {
                ctx.record(NodeExecutionResult::ok(
                    &node.id,
                    output.clone(),
                    started_at,
                    t0.elapsed(),
                ));
                self.notify(ctx, &node.id, true).await;
                ctx.set_variable(&node.id, output);
                self.follow(ctx, &node.id, "output").await
            }
            Err(message) => {
                ctx.record(NodeExecutionResult::failed(
                    &node.id,
                    message.clone(),
                    started_at,
                    t0.elapsed(),
                ));
                self.notify(ctx, &node.id, false).await;
                match self.next_edge(ctx, &node.id, "error").map(|e| e.target.clone()) {
                    Some(target) => {
                        ctx.set_variable(&node.id, json!({ "error": message }));
                        self.run(ctx, target).await
                    }
                    None => Err(Halt::Failed(message)),
                }
            }
        }
    }

    async fn run_output(
        &mut self,
        ctx: &mut FlowExecutionContext,
        node: &FlowNode,
    ) -> Result<(), Halt> {
        let data: OutputNodeData = match node.decode() {
            Ok(data) => data,
            Err(err) => return self.fail_node(ctx, node, err.to_string()).await,
        };
        let started_at = Utc::now();

        let exported = match &data.variable {
            Some(name) => ctx.variable(name).cloned().unwrap_or(Value::Null),
            None => ctx.variables.clone(),
        };
        ctx.output = Some(exported.clone());
        ctx.record(NodeExecutionResult::ok(
            &node.id,
            exported,
            started_at,
            Duration::ZERO,
        ));
        self.notify(ctx, &node.id, true).await;
        // Terminal by contract: output nodes have no outgoing ports.
        Ok(())
    }

    async fn fail_node(
        &mut self,
        ctx: &mut FlowExecutionContext,
        node: &FlowNode,
        message: String,
    ) -> Result<(), Halt> {
        ctx.record(NodeExecutionResult::failed(
            &node.id,
            message.clone(),
            Utc::now(),
            Duration::ZERO,
        ));
        self.notify(ctx, &node.id, false).await;
        Err(Halt::Failed(message))
    }

    async fn notify(&self, ctx: &FlowExecutionContext, node_id: &str, success: bool) {
        self.engine
            .emit(RuntimeEvent::NodeExecuted {
                execution_id: ctx.execution_id.clone(),
                node_id: node_id.to_string(),
                success,
            })
            .await;
    }
}
