//! Plugin system: contracts, resolution, dependency-ordered lifecycle.

pub mod context;
pub mod loader;
pub mod traits;

pub use context::PluginContext;
pub use loader::{LoadReport, PluginManager, PluginSource};
pub use traits::{
    Action, ActionResult, CapabilityContext, Evaluator, Plugin, PluginMetadata, Provider,
    ProviderCacheConfig, ProviderResult,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, TtlCache};
    use crate::error::CoreError;
    use crate::hooks::HookDispatcher;
    use crate::registry::ServiceRegistry;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct TestPlugin {
        metadata: PluginMetadata,
        fail_init: bool,
        initialized: Arc<AtomicBool>,
        destroyed: Arc<AtomicBool>,
    }

    impl TestPlugin {
        fn source(name: &str, deps: &[&str]) -> (PluginSource, Arc<AtomicBool>, Arc<AtomicBool>) {
            let initialized = Arc::new(AtomicBool::new(false));
            let destroyed = Arc::new(AtomicBool::new(false));
            let plugin = TestPlugin {
                metadata: PluginMetadata::new(name, "1.0.0")
                    .with_dependencies(deps.iter().map(|d| d.to_string()).collect()),
                fail_init: false,
                initialized: initialized.clone(),
                destroyed: destroyed.clone(),
            };
            (
                PluginSource::Instance(Box::new(plugin)),
                initialized,
                destroyed,
            )
        }

        fn failing(name: &str) -> PluginSource {
            PluginSource::Instance(Box::new(TestPlugin {
                metadata: PluginMetadata::new(name, "1.0.0"),
                fail_init: true,
                initialized: Arc::new(AtomicBool::new(false)),
                destroyed: Arc::new(AtomicBool::new(false)),
            }))
        }
    }

    #[async_trait]
    impl Plugin for TestPlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }

        async fn init(&self, _context: &mut PluginContext<'_>) -> Result<(), CoreError> {
            if self.fail_init {
                return Err(CoreError::execution(
                    self.metadata.name.clone(),
                    "init failed",
                ));
            }
            self.initialized.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn destroy(&self) -> Result<(), CoreError> {
            self.destroyed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn manager() -> PluginManager {
        PluginManager::new(
            ServiceRegistry::new(),
            HookDispatcher::new(),
            Arc::new(TtlCache::new(CacheConfig::default())),
        )
    }

    fn no_config() -> HashMap<String, Value> {
        HashMap::new()
    }

    #[tokio::test]
    async fn test_dependency_order_respected() {
        let mut manager = manager();
        // Declared in reverse dependency order on purpose.
        let (c, ..) = TestPlugin::source("c", &["b"]);
        let (b, ..) = TestPlugin::source("b", &["a"]);
        let (a, ..) = TestPlugin::source("a", &[]);

        let report = manager.load(vec![c, b, a], &no_config()).await.unwrap();
        assert_eq!(report.activated, vec!["a", "b", "c"]);
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_any_init() {
        let mut manager = manager();
        let (a, a_init, _) = TestPlugin::source("a", &["b"]);
        let (b, b_init, _) = TestPlugin::source("b", &["a"]);

        let err = manager.load(vec![a, b], &no_config()).await.unwrap_err();
        assert!(matches!(err, CoreError::Dependency(_)));
        assert!(!a_init.load(Ordering::SeqCst));
        assert!(!b_init.load(Ordering::SeqCst));
        assert!(manager.loaded_plugins().is_empty());
    }

    #[tokio::test]
    async fn test_missing_hard_dependency_fails_only_that_plugin() {
        let mut manager = manager();
        let (ok, ..) = TestPlugin::source("standalone", &[]);
        let (broken, broken_init, _) = TestPlugin::source("broken", &["ghost"]);

        let report = manager.load(vec![ok, broken], &no_config()).await.unwrap();
        assert_eq!(report.activated, vec!["standalone"]);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0].1, CoreError::Dependency(_)));
        assert!(!broken_init.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_init_failure_isolated_and_dependents_skipped() {
        let mut manager = manager();
        let (good, ..) = TestPlugin::source("good", &[]);
        let bad = TestPlugin::failing("bad");
        let (dependent, dep_init, _) = TestPlugin::source("dependent", &["bad"]);

        let report = manager
            .load(vec![good, bad, dependent], &no_config())
            .await
            .unwrap();
        assert_eq!(report.activated, vec!["good"]);
        assert_eq!(report.failed.len(), 2);
        assert!(!dep_init.load(Ordering::SeqCst));
        assert!(manager.is_loaded("good"));
        assert!(!manager.is_loaded("bad"));
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let mut manager = manager();
        let (first, ..) = TestPlugin::source("dup", &[]);
        let (second, ..) = TestPlugin::source("dup", &[]);
        let err = manager
            .load(vec![first, second], &no_config())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unload_runs_destroy_and_unregisters() {
        let mut manager = manager();
        let (source, _, destroyed) = TestPlugin::source("p", &[]);
        manager.load(vec![source], &no_config()).await.unwrap();
        assert!(manager.is_loaded("p"));

        manager.unload("p").await.unwrap();
        assert!(destroyed.load(Ordering::SeqCst));
        assert!(!manager.is_loaded("p"));

        let err = manager.unload("p").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_shutdown_all_reverse_order() {
        let mut manager = manager();
        let (a, _, a_destroyed) = TestPlugin::source("a", &[]);
        let (b, _, b_destroyed) = TestPlugin::source("b", &["a"]);
        manager.load(vec![a, b], &no_config()).await.unwrap();

        manager.shutdown_all().await;
        assert!(a_destroyed.load(Ordering::SeqCst));
        assert!(b_destroyed.load(Ordering::SeqCst));
        assert!(manager.loaded_plugins().is_empty());
    }

    #[tokio::test]
    async fn test_factory_source_resolved_lazily() {
        let mut manager = manager();
        let source = PluginSource::Factory(Box::new(|| {
            Box::new(TestPlugin {
                metadata: PluginMetadata::new("from-factory", "0.1.0"),
                fail_init: false,
                initialized: Arc::new(AtomicBool::new(false)),
                destroyed: Arc::new(AtomicBool::new(false)),
            })
        }));
        let report = manager.load(vec![source], &no_config()).await.unwrap();
        assert_eq!(report.activated, vec!["from-factory"]);
    }

    #[tokio::test]
    async fn test_plugin_config_section_delivered() {
        struct ConfigProbe {
            metadata: PluginMetadata,
            seen: Arc<parking_lot::Mutex<Value>>,
        }

        #[async_trait]
        impl Plugin for ConfigProbe {
            fn metadata(&self) -> &PluginMetadata {
                &self.metadata
            }

            async fn init(&self, context: &mut PluginContext<'_>) -> Result<(), CoreError> {
                *self.seen.lock() = context.config().clone();
                Ok(())
            }
        }

        let mut manager = manager();
        let seen = Arc::new(parking_lot::Mutex::new(Value::Null));
        let source = PluginSource::Instance(Box::new(ConfigProbe {
            metadata: PluginMetadata::new("probe", "1.0.0"),
            seen: seen.clone(),
        }));
        let mut config = HashMap::new();
        config.insert("probe".to_string(), json!({"api_key": "k"}));

        manager.load(vec![source], &config).await.unwrap();
        assert_eq!(*seen.lock(), json!({"api_key": "k"}));
    }
}
