//! Runtime configuration.
//!
//! Deserialized from camelCase JSON; every field has a default so partial
//! configs are fine. `max_concurrent_tasks` and `task_timeout_ms` feed the
//! operation runner and flow execution defaults when a call site does not
//! override them.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Diagnostic verbosity, mapped onto `tracing` levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// A chain the runtime may operate against. Opaque to the core; plugins
/// interpret it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rpc_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    pub debug: bool,
    pub log_level: LogLevel,
    /// Plugin names expected by this deployment, for diagnostics only; the
    /// actual set is whatever sources are handed to the builder.
    pub plugins: Vec<String>,
    /// Per-plugin configuration sections, keyed by plugin name.
    pub plugin_config: HashMap<String, Value>,
    pub default_chain_id: Option<u64>,
    pub chains: Vec<ChainConfig>,
    /// Concurrency cap applied to batched operations when unspecified.
    pub max_concurrent_tasks: usize,
    /// Default timeout for scheduled tasks and operations without one.
    pub task_timeout_ms: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: LogLevel::Info,
            plugins: Vec::new(),
            plugin_config: HashMap::new(),
            default_chain_id: None,
            chains: Vec::new(),
            max_concurrent_tasks: 10,
            task_timeout_ms: None,
        }
    }
}

impl RuntimeConfig {
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config: RuntimeConfig = serde_json::from_value(json!({})).unwrap();
        assert!(!config.debug);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.max_concurrent_tasks, 10);
        assert!(config.task_timeout().is_none());
    }

    #[test]
    fn test_camel_case_fields() {
        let config: RuntimeConfig = serde_json::from_value(json!({
            "debug": true,
            "logLevel": "debug",
            "plugins": ["wallet", "dex"],
            "pluginConfig": {"dex": {"slippageBps": 50}},
            "defaultChainId": 8453,
            "chains": [{"chainId": 8453, "name": "base"}],
            "maxConcurrentTasks": 4,
            "taskTimeoutMs": 30000
        }))
        .unwrap();
        assert!(config.debug);
        assert_eq!(config.log_level.as_tracing_level(), tracing::Level::DEBUG);
        assert_eq!(config.plugins.len(), 2);
        assert_eq!(config.plugin_config["dex"]["slippageBps"], 50);
        assert_eq!(config.default_chain_id, Some(8453));
        assert_eq!(config.chains[0].chain_id, 8453);
        assert_eq!(config.task_timeout(), Some(Duration::from_millis(30000)));
    }
}
