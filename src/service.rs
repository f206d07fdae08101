//! Prompt execution through the response cache and the agent pool.
//!
//! [`PromptService::run`] is the request path: normalize the model name,
//! look the request up in the cache, and on a miss lease an agent, run the
//! prompt with no lock held, cache the successful response and return the
//! agent. A failed invocation is never cached.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::config::{Config, ProviderConfig};
use crate::error::Result;
use crate::metrics::MetricsSnapshot;
use crate::pool::AgentPool;
use crate::providers::{normalize_model, AgentFactory, KeyCheckedFactory, RequestParams};

/// Result of a prompt run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOutcome {
    pub response: String,
    /// Canonical `provider:model` identifier the prompt ran against.
    pub model_id: String,
    /// Whether the response was served from cache.
    pub cached: bool,
}

/// Cache-fronted access to pooled agents.
#[derive(Clone)]
pub struct PromptService {
    pool: AgentPool,
    cache: Arc<ResponseCache>,
    providers: ProviderConfig,
}

impl PromptService {
    pub fn new(pool: AgentPool, cache: Arc<ResponseCache>, providers: ProviderConfig) -> Self {
        Self {
            pool,
            cache,
            providers,
        }
    }

    /// Build a pool and cache from `config`. The factory is wrapped so a
    /// model whose provider has no API key fails before construction.
    pub fn from_config<F>(factory: F, config: &Config) -> Self
    where
        F: AgentFactory + 'static,
    {
        let checked = KeyCheckedFactory::new(factory, config.providers.clone());
        let pool = AgentPool::new(Arc::new(checked), &config.pool);
        let cache = Arc::new(ResponseCache::new(&config.cache));
        Self::new(pool, cache, config.providers.clone())
    }

    pub fn pool(&self) -> &AgentPool {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Run `prompt` against `model`, or the default model when `None`.
    pub async fn run(
        &self,
        prompt: &str,
        model: Option<&str>,
        params: &RequestParams,
    ) -> Result<PromptOutcome> {
        let model_id = normalize_model(model, &self.providers);
        let key = self.cache.cache_key(prompt, &model_id, params);

        if let Some(response) = self.cache.get_by_key(&key) {
            debug!(model = %model_id, key = %key.short(), "Serving cached response");
            return Ok(PromptOutcome {
                response,
                model_id,
                cached: true,
            });
        }

        let lease = self.pool.acquire(&model_id).await?;
        // An error here drops the lease, which returns the agent.
        let response = lease.run(prompt, params).await?;
        self.cache.put_by_key(key, response.clone(), None);
        if let Err(e) = lease.release() {
            warn!(model = %model_id, error = %e, "Agent release after prompt failed");
        }

        Ok(PromptOutcome {
            response,
            model_id,
            cached: false,
        })
    }

    /// Current pool and cache statistics with recommendations.
    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::capture(&self.pool, &self.cache)
    }
}

impl std::fmt::Debug for PromptService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptService")
            .field("pool_capacity", &self.pool.capacity())
            .field("cache", &self.cache)
            .field("providers", &self.providers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;
    use crate::providers::{AgentClient, MockAgentClient};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Hands out pre-built mock clients in order.
    struct MockFactory {
        clients: Mutex<Vec<Arc<dyn AgentClient>>>,
    }

    impl MockFactory {
        fn new(clients: Vec<MockAgentClient>) -> Self {
            let clients = clients
                .into_iter()
                .rev()
                .map(|c| Arc::new(c) as Arc<dyn AgentClient>)
                .collect();
            Self {
                clients: Mutex::new(clients),
            }
        }
    }

    #[async_trait]
    impl AgentFactory for MockFactory {
        async fn create(&self, model_id: &str) -> Result<Arc<dyn AgentClient>> {
            self.clients
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| PoolError::Construction {
                    model_id: model_id.to_string(),
                    reason: "no more mock clients".into(),
                })
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.providers.openai_api_key = Some("sk-test".into());
        config.pool.acquire_timeout_ms = 100;
        config
    }

    #[tokio::test]
    async fn test_second_run_is_cached() {
        let mut client = MockAgentClient::new();
        client
            .expect_run()
            .times(1)
            .returning(|prompt, _| Ok(format!("answer to {prompt}")));

        let service = PromptService::from_config(MockFactory::new(vec![client]), &test_config());
        let params = RequestParams::new();

        let first = service.run("ping", Some("gpt-4o"), &params).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.model_id, "openai:gpt-4o");
        assert_eq!(first.response, "answer to ping");

        let second = service.run("ping", Some("openai:gpt-4o"), &params).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.response, first.response);

        let stats = service.pool().stats();
        assert_eq!(stats.checked_out, 0);
        assert_eq!(stats.idle, 1);
    }

    #[tokio::test]
    async fn test_failed_run_is_not_cached() {
        let mut client = MockAgentClient::new();
        let mut seq = mockall::Sequence::new();
        client
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(PoolError::Provider("rate limited".into())));
        client
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("recovered".into()));

        let service = PromptService::from_config(MockFactory::new(vec![client]), &test_config());
        let params = RequestParams::new();

        let err = service.run("ping", None, &params).await.unwrap_err();
        assert!(matches!(err, PoolError::Provider(_)));
        assert!(service.cache().is_empty());
        // The agent went back to the pool despite the error.
        assert_eq!(service.pool().stats().checked_out, 0);

        let ok = service.run("ping", None, &params).await.unwrap();
        assert!(!ok.cached);
        assert_eq!(ok.response, "recovered");
        assert_eq!(service.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_construction() {
        let service = PromptService::from_config(MockFactory::new(vec![]), &test_config());
        let err = service
            .run("hi", Some("claude-3-haiku"), &RequestParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Construction { .. }));
        assert!(service.pool().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_cache_always_runs() {
        let mut client = MockAgentClient::new();
        client.expect_run().times(2).returning(|_, _| Ok("fresh".into()));

        let mut config = test_config();
        config.cache.enabled = false;
        let service = PromptService::from_config(MockFactory::new(vec![client]), &config);

        for _ in 0..2 {
            let out = service.run("q", None, &RequestParams::new()).await.unwrap();
            assert!(!out.cached);
        }
        assert_eq!(service.cache().stats().insertions, 0);
    }
}
