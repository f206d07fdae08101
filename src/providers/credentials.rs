//! Factory decorator that refuses to build clients without credentials.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::ProviderConfig;
use crate::error::Result;

use super::model::ModelSpec;
use super::{AgentClient, AgentFactory};

/// Wraps an inner [`AgentFactory`] and checks the model identifier and the
/// provider API key before delegating construction.
///
/// A missing key fails fast with `PoolError::Construction` instead of
/// surfacing later as an opaque provider error.
pub struct KeyCheckedFactory<F> {
    inner: F,
    providers: ProviderConfig,
}

impl<F: AgentFactory> KeyCheckedFactory<F> {
    pub fn new(inner: F, providers: ProviderConfig) -> Self {
        Self { inner, providers }
    }
}

impl<F> std::fmt::Debug for KeyCheckedFactory<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCheckedFactory")
            .field("providers", &self.providers)
            .finish()
    }
}

#[async_trait]
impl<F: AgentFactory> AgentFactory for KeyCheckedFactory<F> {
    async fn create(&self, model_id: &str) -> Result<Arc<dyn AgentClient>> {
        let parsed = ModelSpec::parse(model_id)?;
        if let Err(e) = parsed.require_api_key(&self.providers) {
            warn!(model = %model_id, error = %e, "Refusing to construct agent");
            return Err(e);
        }
        self.inner.create(model_id).await
    }
}
