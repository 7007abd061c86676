//! Plugin resolution, dependency ordering and lifecycle.
//!
//! Sources are in-process instances or factory functions; there is no
//! runtime dynamic code loading. Activation follows a topological order of
//! the declared dependencies: a dependency cycle rejects the whole batch
//! before any `init` runs, an unmet hard dependency fails only the affected
//! plugin (and its dependents), and an `init` failure never disturbs
//! already-activated plugins.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::graph::DiGraph;
use serde_json::Value;

use super::context::PluginContext;
use super::traits::Plugin;
use crate::cache::TtlCache;
use crate::error::CoreError;
use crate::events::RuntimeEvent;
use crate::hooks::{EmitOptions, HookDispatcher, HookRegistration};
use crate::registry::ServiceRegistry;

/// Where a plugin comes from.
pub enum PluginSource {
    /// Pre-built instance.
    Instance(Box<dyn Plugin>),
    /// Deferred construction, run during resolution.
    Factory(Box<dyn FnOnce() -> Box<dyn Plugin> + Send>),
}

impl PluginSource {
    fn resolve(self) -> Box<dyn Plugin> {
        match self {
            PluginSource::Instance(plugin) => plugin,
            PluginSource::Factory(factory) => factory(),
        }
    }
}

/// Outcome of one load pipeline run.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Plugin names that reached `init` successfully, in activation order.
    pub activated: Vec<String>,
    /// Plugins that failed activation, with the reason. Already-activated
    /// plugins are unaffected.
    pub failed: Vec<(String, CoreError)>,
}

struct LoadedPlugin {
    plugin: Arc<dyn Plugin>,
    hook_registrations: Vec<HookRegistration>,
}

/// Owns resolved plugins and drives `init`/`destroy`.
pub struct PluginManager {
    registry: ServiceRegistry,
    dispatcher: HookDispatcher,
    cache: Arc<TtlCache<String, Value>>,
    plugins: HashMap<String, LoadedPlugin>,
    activation_order: Vec<String>,
}

impl PluginManager {
    pub fn new(
        registry: ServiceRegistry,
        dispatcher: HookDispatcher,
        cache: Arc<TtlCache<String, Value>>,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            cache,
            plugins: HashMap::new(),
            activation_order: Vec::new(),
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).map(|loaded| loaded.plugin.clone())
    }

    /// Names of loaded plugins, in activation order.
    pub fn loaded_plugins(&self) -> Vec<String> {
        self.activation_order.clone()
    }

    /// Resolve, validate, order and activate a batch of plugins.
    ///
    /// `plugin_config` supplies each plugin's configuration section, keyed
    /// by plugin name.
    pub async fn load(
        &mut self,
        sources: Vec<PluginSource>,
        plugin_config: &HashMap<String, Value>,
    ) -> Result<LoadReport, CoreError> {
        let batch: Vec<Box<dyn Plugin>> = sources.into_iter().map(PluginSource::resolve).collect();

        self.validate_batch(&batch)?;
        let order = self.activation_order(&batch)?;

        let mut by_name: HashMap<String, Box<dyn Plugin>> = batch
            .into_iter()
            .map(|plugin| (plugin.metadata().name.clone(), plugin))
            .collect();

        let mut report = LoadReport::default();
        let mut failed: HashSet<String> = HashSet::new();

        for name in order {
            let plugin = match by_name.remove(&name) {
                Some(plugin) => plugin,
                None => continue,
            };
            let metadata = plugin.metadata().clone();

            if let Some(unmet) = metadata.dependencies.iter().find(|dep| {
                failed.contains(*dep) || !(self.is_loaded(dep) || report.activated.contains(dep))
            }) {
                let err = CoreError::Dependency(format!(
                    "plugin '{name}' requires '{unmet}', which is not available"
                ));
                tracing::warn!(plugin = %name, error = %err, "plugin skipped");
                failed.insert(name.clone());
                report.failed.push((name, err));
                continue;
            }

            match self.activate(plugin, plugin_config).await {
                Ok(()) => {
                    tracing::info!(plugin = %name, version = %metadata.version, "plugin activated");
                    self.dispatcher
                        .emit(
                            RuntimeEvent::PluginLoaded {
                                name: name.clone(),
                                version: metadata.version.clone(),
                            },
                            EmitOptions::default(),
                        )
                        .await;
                    report.activated.push(name);
                }
                Err(err) => {
                    tracing::warn!(plugin = %name, error = %err, "plugin init failed");
                    failed.insert(name.clone());
                    report.failed.push((name, err));
                }
            }
        }

        Ok(report)
    }

    /// Destroy one plugin and remove everything it registered.
    pub async fn unload(&mut self, name: &str) -> Result<(), CoreError> {
        let loaded = self
            .plugins
            .remove(name)
            .ok_or_else(|| CoreError::not_found("plugin", name))?;

        if let Err(err) = loaded.plugin.destroy().await {
            tracing::warn!(plugin = %name, error = %err, "plugin destroy failed");
        }
        drop(loaded.hook_registrations);
        self.registry.unregister_plugin(name);
        self.dispatcher.unregister_owner(name);
        self.activation_order.retain(|n| n != name);

        self.dispatcher
            .emit(
                RuntimeEvent::PluginUnloaded {
                    name: name.to_string(),
                },
                EmitOptions::default(),
            )
            .await;
        Ok(())
    }

    /// Destroy all plugins in reverse activation order.
    pub async fn shutdown_all(&mut self) {
        let order: Vec<String> = self.activation_order.iter().rev().cloned().collect();
        for name in order {
            if let Err(err) = self.unload(&name).await {
                tracing::warn!(plugin = %name, error = %err, "plugin unload failed during shutdown");
            }
        }
    }

    fn validate_batch(&self, batch: &[Box<dyn Plugin>]) -> Result<(), CoreError> {
        let mut seen = HashSet::new();
        for plugin in batch {
            let metadata = plugin.metadata();
            if metadata.name.trim().is_empty() {
                return Err(CoreError::Validation("plugin name must not be empty".into()));
            }
            if metadata.version.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "plugin '{}' declares an empty version",
                    metadata.name
                )));
            }
            if self.is_loaded(&metadata.name) || !seen.insert(metadata.name.clone()) {
                return Err(CoreError::Validation(format!(
                    "duplicate plugin name: '{}'",
                    metadata.name
                )));
            }
        }
        Ok(())
    }

    /// Topological order over the batch. Optional dependencies order the
    /// batch when present and are otherwise ignored.
    fn activation_order(&self, batch: &[Box<dyn Plugin>]) -> Result<Vec<String>, CoreError> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut indices = HashMap::new();
        for plugin in batch {
            let name = plugin.metadata().name.clone();
            let idx = graph.add_node(name.clone());
            indices.insert(name, idx);
        }
        for plugin in batch {
            let metadata = plugin.metadata();
            let to = indices[&metadata.name];
            for dep in metadata
                .dependencies
                .iter()
                .chain(metadata.optional_dependencies.iter())
            {
                if let Some(&from) = indices.get(dep) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        match petgraph::algo::toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(|idx| graph[idx].clone()).collect()),
            Err(cycle) => Err(CoreError::Dependency(format!(
                "circular plugin dependency involving '{}'",
                graph[cycle.node_id()]
            ))),
        }
    }

    async fn activate(
        &mut self,
        plugin: Box<dyn Plugin>,
        plugin_config: &HashMap<String, Value>,
    ) -> Result<(), CoreError> {
        let metadata = plugin.metadata().clone();
        let config = plugin_config
            .get(&metadata.name)
            .cloned()
            .unwrap_or(Value::Null);

        let mut context = PluginContext::new(
            metadata.name.clone(),
            &self.registry,
            &self.dispatcher,
            &self.cache,
            config,
        );
        plugin.init(&mut context).await?;
        let mut hook_registrations = std::mem::take(&mut context.hook_registrations);
        drop(context);

        for action in plugin.actions() {
            self.registry.register_action(action, &metadata.name);
        }
        for provider in plugin.providers() {
            self.registry.register_provider(provider, &metadata.name);
        }
        for evaluator in plugin.evaluators() {
            self.registry.register_evaluator(evaluator, &metadata.name);
        }
        for hook in plugin.hooks() {
            hook_registrations.push(self.dispatcher.register(hook, Some(&metadata.name)));
        }

        self.plugins.insert(
            metadata.name.clone(),
            LoadedPlugin {
                plugin: Arc::from(plugin),
                hook_registrations,
            },
        );
        self.activation_order.push(metadata.name);
        Ok(())
    }
}
