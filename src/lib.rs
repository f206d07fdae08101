//! agentpool - reusable LLM agent clients and response caching.
//!
//! Two in-process building blocks for services that call LLM providers:
//!
//! - [`AgentPool`]: a bounded, LRU-evicting pool of agent clients keyed by
//!   model identifier. Callers [`acquire`](AgentPool::acquire) an
//!   [`AgentLease`] that returns the client when released or dropped.
//! - [`ResponseCache`]: a TTL-expiring map from request fingerprints
//!   (prompt, model, output-affecting params) to stored responses.
//!
//! [`PromptService`] combines them into the usual request path, and
//! [`maintenance::start_maintenance`] keeps both tidy in the background.
//!
//! ```
//! use std::sync::Arc;
//!
//! use agentpool::config::PoolConfig;
//! use agentpool::{AgentClient, AgentFactory, AgentPool, RequestParams, Result};
//! use async_trait::async_trait;
//!
//! struct Echo(String);
//!
//! #[async_trait]
//! impl AgentClient for Echo {
//!     fn model_id(&self) -> &str {
//!         &self.0
//!     }
//!
//!     async fn run(&self, prompt: &str, _params: &RequestParams) -> Result<String> {
//!         Ok(format!("{}: {}", self.0, prompt))
//!     }
//! }
//!
//! struct EchoFactory;
//!
//! #[async_trait]
//! impl AgentFactory for EchoFactory {
//!     async fn create(&self, model_id: &str) -> Result<Arc<dyn AgentClient>> {
//!         Ok(Arc::new(Echo(model_id.to_string())))
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let pool = AgentPool::new(Arc::new(EchoFactory), &PoolConfig::default());
//! let lease = pool.acquire("openai:gpt-4o-mini").await?;
//! let reply = lease.run("hi", &RequestParams::new()).await?;
//! assert_eq!(reply, "openai:gpt-4o-mini: hi");
//! lease.release()?;
//! # Ok::<(), agentpool::PoolError>(())
//! # }).unwrap();
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod maintenance;
pub mod metrics;
pub mod pool;
pub mod providers;
pub mod service;

pub use cache::{CacheStats, Fingerprint, ResponseCache};
pub use config::Config;
pub use error::{PoolError, Result};
pub use metrics::MetricsSnapshot;
pub use pool::{AgentLease, AgentPool, LeaseId, PoolStats};
pub use providers::{AgentClient, AgentFactory, RequestParams};
pub use service::{PromptOutcome, PromptService};
