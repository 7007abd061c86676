//! Plugin and capability contracts.
//!
//! A [`Plugin`] bundles named capabilities (actions, providers, evaluators,
//! hooks) behind compile-time-checked traits; there is no runtime shape
//! probing. Plugins are resolved from in-process sources and activated in
//! dependency order by the loader.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::context::PluginContext;
use crate::error::CoreError;
use crate::hooks::Hook;

/// Plugin identity and dependency declarations.
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    pub name: String,
    pub version: String,
    /// Hard dependencies. A plugin with an unmet hard dependency never
    /// reaches `init`.
    pub dependencies: Vec<String>,
    /// Soft dependencies: ordered before this plugin when present, ignored
    /// when absent.
    pub optional_dependencies: Vec<String>,
    pub description: String,
}

impl PluginMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            dependencies: Vec::new(),
            optional_dependencies: Vec::new(),
            description: String::new(),
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_optional_dependencies(mut self, deps: Vec<String>) -> Self {
        self.optional_dependencies = deps;
        self
    }
}

/// Unified plugin interface.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> &PluginMetadata;

    /// Actions contributed by this plugin, registered after a successful
    /// `init`.
    fn actions(&self) -> Vec<Arc<dyn Action>> {
        Vec::new()
    }

    fn providers(&self) -> Vec<Arc<dyn Provider>> {
        Vec::new()
    }

    fn evaluators(&self) -> Vec<Arc<dyn Evaluator>> {
        Vec::new()
    }

    fn hooks(&self) -> Vec<Hook> {
        Vec::new()
    }

    /// Activate the plugin. Failure aborts only this plugin's activation.
    async fn init(&self, context: &mut PluginContext<'_>) -> Result<(), CoreError>;

    /// Teardown, invoked on unload and shutdown (reverse activation order).
    async fn destroy(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Execution context handed to actions and providers.
#[derive(Debug, Clone, Default)]
pub struct CapabilityContext {
    pub input: Value,
    pub variables: Value,
}

impl CapabilityContext {
    pub fn with_input(input: Value) -> Self {
        Self {
            input,
            variables: Value::Null,
        }
    }
}

/// Outcome of an [`Action`] execution.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Named side-effecting operation exposed by a plugin.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    /// Optional input validation, checked before `execute`.
    fn validate(&self, _input: &Value) -> Result<(), CoreError> {
        Ok(())
    }

    async fn execute(&self, context: &CapabilityContext) -> Result<ActionResult, CoreError>;
}

/// Cache hints declared by a provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCacheConfig {
    pub ttl: Duration,
    pub max_size: usize,
}

/// Outcome of a [`Provider`] fetch.
#[derive(Debug, Clone)]
pub struct ProviderResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub cached: bool,
}

impl ProviderResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
            cached: false,
        }
    }
}

/// Named read/query operation exposed by a plugin. Cache-eligible.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Provider category, e.g. `"market-data"`.
    fn provider_type(&self) -> &str {
        "generic"
    }

    fn cache_config(&self) -> Option<ProviderCacheConfig> {
        None
    }

    async fn get(&self, context: &CapabilityContext) -> Result<ProviderResult, CoreError>;
}

/// Named boolean-condition check exposed by a plugin.
#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(&self, context: &CapabilityContext) -> Result<bool, CoreError>;
}
