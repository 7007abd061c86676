//! Context handed to a plugin's `init`.
//!
//! Dependencies are injected explicitly; plugins never reach for process
//! globals. Capabilities registered through the context are tagged with the
//! plugin's name so teardown can remove them in bulk.

use std::sync::Arc;

use serde_json::Value;

use super::traits::{Action, Evaluator, Provider};
use crate::cache::TtlCache;
use crate::hooks::{Hook, HookDispatcher, HookRegistration};
use crate::registry::ServiceRegistry;

pub struct PluginContext<'a> {
    plugin_name: String,
    registry: &'a ServiceRegistry,
    dispatcher: &'a HookDispatcher,
    cache: &'a Arc<TtlCache<String, Value>>,
    config: Value,
    pub(crate) hook_registrations: Vec<HookRegistration>,
}

impl<'a> PluginContext<'a> {
    pub(crate) fn new(
        plugin_name: String,
        registry: &'a ServiceRegistry,
        dispatcher: &'a HookDispatcher,
        cache: &'a Arc<TtlCache<String, Value>>,
        config: Value,
    ) -> Self {
        Self {
            plugin_name,
            registry,
            dispatcher,
            cache,
            config,
            hook_registrations: Vec::new(),
        }
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// Plugin-specific configuration section, `Null` when absent.
    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn registry(&self) -> &ServiceRegistry {
        self.registry
    }

    pub fn cache(&self) -> &Arc<TtlCache<String, Value>> {
        self.cache
    }

    /// Register an extra action beyond the plugin's declared list.
    pub fn register_action(&self, action: Arc<dyn Action>) {
        self.registry.register_action(action, &self.plugin_name);
    }

    pub fn register_provider(&self, provider: Arc<dyn Provider>) {
        self.registry.register_provider(provider, &self.plugin_name);
    }

    pub fn register_evaluator(&self, evaluator: Arc<dyn Evaluator>) {
        self.registry
            .register_evaluator(evaluator, &self.plugin_name);
    }

    /// Register an extra hook, owned by this plugin.
    pub fn register_hook(&mut self, hook: Hook) {
        let registration = self.dispatcher.register(hook, Some(&self.plugin_name));
        self.hook_registrations.push(registration);
    }
}
