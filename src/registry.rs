//! Named capability registry.
//!
//! Actions, providers and evaluators are registered under a canonical name
//! and tagged with the owning plugin so a plugin's capabilities can be torn
//! down in one step. Re-registration under an existing name is
//! last-writer-wins; the overwrite is logged.
//!
//! A provider declaring a [`ProviderCacheConfig`] is wrapped at registration:
//! lookups hand back a caching front that serves repeat fetches for the same
//! input from a per-provider [`TtlCache`], de-duplicating concurrent misses.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::cache::{CacheConfig, TtlCache};
use crate::error::CoreError;
use crate::plugin::{
    Action, CapabilityContext, Evaluator, Provider, ProviderCacheConfig, ProviderResult,
};

struct Registered<T: ?Sized> {
    capability: Arc<T>,
    owner: String,
}

impl<T: ?Sized> Clone for Registered<T> {
    fn clone(&self) -> Self {
        Self {
            capability: self.capability.clone(),
            owner: self.owner.clone(),
        }
    }
}

struct RegistryInner {
    actions: HashMap<String, Registered<dyn Action>>,
    providers: HashMap<String, Registered<dyn Provider>>,
    evaluators: HashMap<String, Registered<dyn Evaluator>>,
}

/// Process-wide registry of plugin capabilities.
#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                actions: HashMap::new(),
                providers: HashMap::new(),
                evaluators: HashMap::new(),
            })),
        }
    }

    pub fn register_action(&self, action: Arc<dyn Action>, owner: &str) {
        let name = action.name().to_string();
        let mut inner = self.inner.write();
        if let Some(previous) = inner.actions.insert(
            name.clone(),
            Registered {
                capability: action,
                owner: owner.to_string(),
            },
        ) {
            tracing::warn!(
                name,
                previous_owner = %previous.owner,
                new_owner = owner,
                "action re-registered, previous binding replaced"
            );
        }
    }

    pub fn register_provider(&self, provider: Arc<dyn Provider>, owner: &str) {
        let provider: Arc<dyn Provider> = match provider.cache_config() {
            Some(config) => Arc::new(CachedProvider::new(provider, config)),
            None => provider,
        };
        let name = provider.name().to_string();
        let mut inner = self.inner.write();
        if let Some(previous) = inner.providers.insert(
            name.clone(),
            Registered {
                capability: provider,
                owner: owner.to_string(),
            },
        ) {
            tracing::warn!(
                name,
                previous_owner = %previous.owner,
                new_owner = owner,
                "provider re-registered, previous binding replaced"
            );
        }
    }

    pub fn register_evaluator(&self, evaluator: Arc<dyn Evaluator>, owner: &str) {
        let name = evaluator.name().to_string();
        let mut inner = self.inner.write();
        if let Some(previous) = inner.evaluators.insert(
            name.clone(),
            Registered {
                capability: evaluator,
                owner: owner.to_string(),
            },
        ) {
            tracing::warn!(
                name,
                previous_owner = %previous.owner,
                new_owner = owner,
                "evaluator re-registered, previous binding replaced"
            );
        }
    }

    pub fn action(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.inner.read().actions.get(name).map(|r| r.capability.clone())
    }

    pub fn provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.inner
            .read()
            .providers
            .get(name)
            .map(|r| r.capability.clone())
    }

    pub fn evaluator(&self, name: &str) -> Option<Arc<dyn Evaluator>> {
        self.inner
            .read()
            .evaluators
            .get(name)
            .map(|r| r.capability.clone())
    }

    pub fn actions(&self) -> Vec<Arc<dyn Action>> {
        self.inner
            .read()
            .actions
            .values()
            .map(|r| r.capability.clone())
            .collect()
    }

    pub fn providers(&self) -> Vec<Arc<dyn Provider>> {
        self.inner
            .read()
            .providers
            .values()
            .map(|r| r.capability.clone())
            .collect()
    }

    pub fn evaluators(&self) -> Vec<Arc<dyn Evaluator>> {
        self.inner
            .read()
            .evaluators
            .values()
            .map(|r| r.capability.clone())
            .collect()
    }

    /// Remove every capability whose owner matches, under one write lock so
    /// no partial removal is observable.
    pub fn unregister_plugin(&self, owner: &str) {
        let mut inner = self.inner.write();
        inner.actions.retain(|_, r| r.owner != owner);
        inner.providers.retain(|_, r| r.owner != owner);
        inner.evaluators.retain(|_, r| r.owner != owner);
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Caching front over a provider that declared cache hints. Keys are the
/// fetch input; only successful fetches are stored, so a failing provider
/// is retried on the next call.
struct CachedProvider {
    inner: Arc<dyn Provider>,
    cache: TtlCache<String, Value>,
    config: ProviderCacheConfig,
}

impl CachedProvider {
    fn new(inner: Arc<dyn Provider>, config: ProviderCacheConfig) -> Self {
        let cache = TtlCache::new(CacheConfig {
            default_ttl: Some(config.ttl),
            max_size: config.max_size,
            ..CacheConfig::default()
        });
        Self {
            inner,
            cache,
            config,
        }
    }
}

#[async_trait]
impl Provider for CachedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn provider_type(&self) -> &str {
        self.inner.provider_type()
    }

    fn cache_config(&self) -> Option<ProviderCacheConfig> {
        Some(self.config)
    }

    async fn get(&self, context: &CapabilityContext) -> Result<ProviderResult, CoreError> {
        let key = context.input.to_string();
        if let Some(data) = self.cache.get(&key) {
            let mut result = ProviderResult::ok(data);
            result.cached = true;
            return Ok(result);
        }

        let inner = self.inner.clone();
        let fetch_context = context.clone();
        let data = self
            .cache
            .get_or_set(key, None, move || async move {
                let result = inner.get(&fetch_context).await?;
                if result.success {
                    Ok(result.data.unwrap_or(Value::Null))
                } else {
                    Err(CoreError::execution(
                        inner.name().to_string(),
                        result
                            .error
                            .unwrap_or_else(|| "provider fetch failed".into()),
                    ))
                }
            })
            .await?;
        Ok(ProviderResult::ok(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::ActionResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NamedAction(&'static str);

    #[async_trait]
    impl Action for NamedAction {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(
            &self,
            _context: &CapabilityContext,
        ) -> Result<ActionResult, crate::error::CoreError> {
            Ok(ActionResult::ok(serde_json::json!(self.0)))
        }
    }

    struct NamedEvaluator(&'static str);

    #[async_trait]
    impl Evaluator for NamedEvaluator {
        fn name(&self) -> &str {
            self.0
        }

        async fn evaluate(
            &self,
            _context: &CapabilityContext,
        ) -> Result<bool, crate::error::CoreError> {
            Ok(true)
        }
    }

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        hints: Option<ProviderCacheConfig>,
    }

    #[async_trait]
    impl Provider for CountingProvider {
        fn name(&self) -> &str {
            "price.feed"
        }

        fn cache_config(&self) -> Option<ProviderCacheConfig> {
            self.hints
        }

        async fn get(
            &self,
            context: &CapabilityContext,
        ) -> Result<ProviderResult, crate::error::CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderResult::ok(
                serde_json::json!({ "for": context.input, "price": 42 }),
            ))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ServiceRegistry::new();
        registry.register_action(Arc::new(NamedAction("swap")), "dex");
        assert!(registry.action("swap").is_some());
        assert!(registry.action("missing").is_none());
        assert_eq!(registry.actions().len(), 1);
    }

    #[tokio::test]
    async fn test_last_writer_wins_on_collision() {
        let registry = ServiceRegistry::new();
        registry.register_action(Arc::new(NamedAction("swap")), "dex-v1");
        registry.register_action(Arc::new(NamedAction("swap")), "dex-v2");

        assert_eq!(registry.actions().len(), 1);
        // The surviving binding belongs to the later owner: unregistering
        // the first owner must not remove it.
        registry.unregister_plugin("dex-v1");
        assert!(registry.action("swap").is_some());
    }

    #[tokio::test]
    async fn test_cache_hinted_provider_served_from_cache() {
        let registry = ServiceRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register_provider(
            Arc::new(CountingProvider {
                calls: calls.clone(),
                hints: Some(ProviderCacheConfig {
                    ttl: std::time::Duration::from_secs(60),
                    max_size: 16,
                }),
            }),
            "prices",
        );

        let provider = registry.provider("price.feed").unwrap();
        let context = CapabilityContext::with_input(serde_json::json!({"pair": "ETH/USDC"}));

        let first = provider.get(&context).await.unwrap();
        assert!(!first.cached);
        let second = provider.get(&context).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.data, first.data);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A different input is a different cache key.
        let other = CapabilityContext::with_input(serde_json::json!({"pair": "BTC/USDC"}));
        provider.get(&other).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_provider_without_hints_fetches_every_time() {
        let registry = ServiceRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register_provider(
            Arc::new(CountingProvider {
                calls: calls.clone(),
                hints: None,
            }),
            "prices",
        );

        let provider = registry.provider("price.feed").unwrap();
        let context = CapabilityContext::with_input(serde_json::json!({"pair": "ETH/USDC"}));
        provider.get(&context).await.unwrap();
        provider.get(&context).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unregister_plugin_removes_all_owned() {
        let registry = ServiceRegistry::new();
        registry.register_action(Arc::new(NamedAction("a1")), "p1");
        registry.register_action(Arc::new(NamedAction("a2")), "p1");
        registry.register_evaluator(Arc::new(NamedEvaluator("e1")), "p1");
        registry.register_action(Arc::new(NamedAction("other")), "p2");

        registry.unregister_plugin("p1");
        assert!(registry.action("a1").is_none());
        assert!(registry.action("a2").is_none());
        assert!(registry.evaluator("e1").is_none());
        assert!(registry.action("other").is_some());
    }
}
