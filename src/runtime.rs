//! Runtime assembly and lifecycle.
//!
//! [`Runtime`] wires the cache, registry, dispatcher, runner, scheduler and
//! flow engine together and drives the lifecycle state machine:
//! `uninitialized -> initializing -> loading_plugins -> ready <-> running`,
//! with an `error` excursion on failed initialization and `shutdown` at the
//! end. Plugins are handed their dependencies through [`PluginContext`];
//! there are no process globals.

use std::sync::Arc;

use serde_json::Value;

use crate::cache::{CacheConfig, TtlCache};
use crate::config::RuntimeConfig;
use crate::error::CoreError;
use crate::events::RuntimeEvent;
use crate::flow::{FlowEngine, InMemoryFlowStore};
use crate::hooks::{EmitOptions, HookDispatcher};
use crate::plugin::loader::{LoadReport, PluginManager, PluginSource};
use crate::registry::ServiceRegistry;
use crate::runner::{OperationRunner, RunnerDefaults};
use crate::scheduler::Scheduler;
use crate::state::{RuntimeState, StateMachine};

/// Assembles a [`Runtime`] from a config and a set of plugin sources.
#[derive(Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    sources: Vec<PluginSource>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn add_plugin(mut self, source: PluginSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn build(self) -> Runtime {
        let registry = ServiceRegistry::new();
        let dispatcher = HookDispatcher::new();
        let cache = Arc::new(TtlCache::new(CacheConfig::default()));
        let runner = OperationRunner::new(RunnerDefaults {
            timeout: self.config.task_timeout(),
            max_concurrency: self.config.max_concurrent_tasks,
        });
        let scheduler = Scheduler::with_dispatcher(
            runner.clone(),
            self.config.task_timeout(),
            dispatcher.clone(),
        );
        let engine = FlowEngine::new(registry.clone(), runner.clone())
            .with_dispatcher(dispatcher.clone());
        let flows = Arc::new(InMemoryFlowStore::new(engine));
        let plugins = PluginManager::new(registry.clone(), dispatcher.clone(), cache.clone());

        Runtime {
            config: self.config,
            registry,
            dispatcher,
            cache,
            runner,
            scheduler,
            flows,
            plugins,
            state: StateMachine::new(),
            pending_sources: self.sources,
        }
    }
}

/// The assembled runtime. Owns the plugin manager and the state machine;
/// all other components are cheaply cloneable handles.
pub struct Runtime {
    config: RuntimeConfig,
    registry: ServiceRegistry,
    dispatcher: HookDispatcher,
    cache: Arc<TtlCache<String, Value>>,
    runner: OperationRunner,
    scheduler: Scheduler,
    flows: Arc<InMemoryFlowStore>,
    plugins: PluginManager,
    state: StateMachine,
    pending_sources: Vec<PluginSource>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn state(&self) -> RuntimeState {
        self.state.state()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &HookDispatcher {
        &self.dispatcher
    }

    pub fn cache(&self) -> &Arc<TtlCache<String, Value>> {
        &self.cache
    }

    pub fn runner(&self) -> &OperationRunner {
        &self.runner
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn flows(&self) -> &Arc<InMemoryFlowStore> {
        &self.flows
    }

    pub fn plugins(&self) -> &PluginManager {
        &self.plugins
    }

    pub fn plugins_mut(&mut self) -> &mut PluginManager {
        &mut self.plugins
    }

    pub fn state_machine(&mut self) -> &mut StateMachine {
        &mut self.state
    }

    /// Drive `uninitialized -> initializing -> loading_plugins -> ready`,
    /// activating the builder's plugin sources along the way. Per-plugin
    /// init failures are reported in the [`LoadReport`]; a structural
    /// failure (bad batch, dependency cycle) moves the runtime to `error`.
    pub async fn initialize(&mut self) -> Result<LoadReport, CoreError> {
        self.transition(RuntimeState::Initializing).await?;
        tracing::info!(plugins = self.pending_sources.len(), "runtime initializing");

        self.transition(RuntimeState::LoadingPlugins).await?;
        let sources = std::mem::take(&mut self.pending_sources);
        let report = match self.plugins.load(sources, &self.config.plugin_config).await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(error = %err, "plugin load pipeline failed");
                self.transition(RuntimeState::Error).await?;
                return Err(err);
            }
        };
        for (name, err) in &report.failed {
            tracing::warn!(plugin = %name, error = %err, "plugin failed to activate");
        }

        self.transition(RuntimeState::Ready).await?;
        self.dispatcher
            .emit(RuntimeEvent::RuntimeInitialized, EmitOptions::default())
            .await;
        tracing::info!(activated = report.activated.len(), "runtime ready");
        Ok(report)
    }

    /// `ready -> running`; scheduled tasks begin firing.
    pub async fn start(&mut self) -> Result<(), CoreError> {
        self.transition(RuntimeState::Running).await?;
        self.scheduler.start();
        self.dispatcher
            .emit(RuntimeEvent::RuntimeStarted, EmitOptions::default())
            .await;
        Ok(())
    }

    /// `running -> ready`; scheduled tasks stop firing but keep their state.
    pub async fn stop(&mut self) -> Result<(), CoreError> {
        self.transition(RuntimeState::Ready).await?;
        self.scheduler.stop();
        self.dispatcher
            .emit(RuntimeEvent::RuntimeStopped, EmitOptions::default())
            .await;
        Ok(())
    }

    /// Tear down: stop the scheduler, destroy plugins in reverse activation
    /// order, and move to `shutdown`.
    pub async fn shutdown(&mut self) -> Result<(), CoreError> {
        self.transition(RuntimeState::Shutdown).await?;
        self.scheduler.stop();
        self.plugins.shutdown_all().await;
        self.dispatcher
            .emit(RuntimeEvent::RuntimeShutdown, EmitOptions::default())
            .await;
        tracing::info!("runtime shut down");
        Ok(())
    }

    async fn transition(&mut self, target: RuntimeState) -> Result<(), CoreError> {
        let from = self.state.state();
        self.state.transition_to(target)?;
        self.dispatcher
            .emit(
                RuntimeEvent::StateChanged { from, to: target },
                EmitOptions::default(),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::plugin::{Plugin, PluginContext, PluginMetadata};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct NullPlugin(PluginMetadata);

    #[async_trait]
    impl Plugin for NullPlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.0
        }

        async fn init(&self, _context: &mut PluginContext<'_>) -> Result<(), CoreError> {
            Ok(())
        }
    }

    fn null_plugin(name: &str) -> PluginSource {
        PluginSource::Instance(Box::new(NullPlugin(PluginMetadata::new(name, "1.0.0"))))
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let mut runtime = Runtime::builder().add_plugin(null_plugin("p1")).build();
        assert_eq!(runtime.state(), RuntimeState::Uninitialized);

        let report = runtime.initialize().await.unwrap();
        assert_eq!(report.activated, vec!["p1"]);
        assert_eq!(runtime.state(), RuntimeState::Ready);

        runtime.start().await.unwrap();
        assert_eq!(runtime.state(), RuntimeState::Running);
        assert!(runtime.scheduler().is_running());

        runtime.stop().await.unwrap();
        assert_eq!(runtime.state(), RuntimeState::Ready);
        assert!(!runtime.scheduler().is_running());

        runtime.shutdown().await.unwrap();
        assert_eq!(runtime.state(), RuntimeState::Shutdown);
        assert!(runtime.plugins().loaded_plugins().is_empty());
    }

    #[tokio::test]
    async fn test_config_defaults_reach_runner() {
        let config = RuntimeConfig {
            max_concurrent_tasks: 4,
            task_timeout_ms: Some(250),
            ..Default::default()
        };
        let runtime = Runtime::builder().with_config(config).build();

        let defaults = runtime.runner().defaults();
        assert_eq!(defaults.max_concurrency, 4);
        assert_eq!(defaults.timeout, Some(std::time::Duration::from_millis(250)));
    }

    #[tokio::test]
    async fn test_start_before_initialize_rejected() {
        let mut runtime = Runtime::builder().build();
        let err = runtime.start().await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(runtime.state(), RuntimeState::Uninitialized);
    }

    #[tokio::test]
    async fn test_dependency_cycle_moves_runtime_to_error() {
        struct DepPlugin(PluginMetadata);

        #[async_trait]
        impl Plugin for DepPlugin {
            fn metadata(&self) -> &PluginMetadata {
                &self.0
            }

            async fn init(&self, _context: &mut PluginContext<'_>) -> Result<(), CoreError> {
                Ok(())
            }
        }

        let a = PluginSource::Instance(Box::new(DepPlugin(
            PluginMetadata::new("a", "1.0.0").with_dependencies(vec!["b".into()]),
        )));
        let b = PluginSource::Instance(Box::new(DepPlugin(
            PluginMetadata::new("b", "1.0.0").with_dependencies(vec!["a".into()]),
        )));

        let mut runtime = Runtime::builder().add_plugin(a).add_plugin(b).build();
        let err = runtime.initialize().await.unwrap_err();
        assert!(matches!(err, CoreError::Dependency(_)));
        assert_eq!(runtime.state(), RuntimeState::Error);

        // The error excursion allows re-initialization.
        assert!(runtime
            .state_machine()
            .transition_to(RuntimeState::Initializing)
            .is_ok());
    }

    #[tokio::test]
    async fn test_lifecycle_events_emitted() {
        let mut runtime = Runtime::builder().build();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        let _reg = runtime.dispatcher().on("state-log", EventKind::StateChanged, move |event| {
            let log = log.clone();
            async move {
                log.lock().push(event.to_value()["to"].as_str().map(String::from));
                Ok(())
            }
        });

        runtime.initialize().await.unwrap();
        runtime.start().await.unwrap();

        let states: Vec<_> = seen.lock().iter().flatten().cloned().collect();
        assert_eq!(
            states,
            vec!["initializing", "loading_plugins", "ready", "running"]
        );
    }
}
