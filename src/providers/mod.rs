//! Agent client abstractions.
//!
//! The pool never talks to an LLM itself. It asks an [`AgentFactory`] to
//! build an [`AgentClient`] for a model identifier and hands that client to
//! callers between acquire and release.

pub mod credentials;
pub mod model;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

pub use credentials::KeyCheckedFactory;
pub use model::{normalize_model, ModelSpec, ProviderKind};

/// Request parameters that may change a model's output (temperature,
/// max tokens, ...). Ordered so serialization is canonical.
pub type RequestParams = BTreeMap<String, serde_json::Value>;

/// A constructed, reusable agent client bound to one model.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Model identifier this client was built for.
    fn model_id(&self) -> &str;

    /// Run a prompt and return the response payload.
    ///
    /// Errors propagate to the caller and are never cached.
    async fn run(&self, prompt: &str, params: &RequestParams) -> Result<String>;
}

/// Builds agent clients. Construction is the expensive step the pool
/// amortizes (client setup, network handshakes).
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn create(&self, model_id: &str) -> Result<Arc<dyn AgentClient>>;
}

#[async_trait]
impl<F: AgentFactory + ?Sized> AgentFactory for Arc<F> {
    async fn create(&self, model_id: &str) -> Result<Arc<dyn AgentClient>> {
        (**self).create(model_id).await
    }
}
