//! Error types for the agent pool and response cache.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the pool, the cache and the prompt service.
#[derive(Debug, Error)]
pub enum PoolError {
    /// No agent became available before the acquire deadline. Either the
    /// model's own agent stayed checked out (`model_busy`) or every slot
    /// did. Transient: callers should retry with backoff.
    #[error(
        "no agent for '{model_id}' after {waited:?}: {}",
        wait_reason(.model_busy, .capacity)
    )]
    PoolExhausted {
        model_id: String,
        capacity: usize,
        waited: Duration,
        model_busy: bool,
    },

    /// A lease was released while not checked out (double release, unknown
    /// lease, or a lease whose entry no longer exists).
    #[error("invalid release: {0}")]
    InvalidRelease(String),

    /// The agent client for a model could not be constructed.
    #[error("agent construction failed for '{model_id}': {reason}")]
    Construction { model_id: String, reason: String },

    /// The agent client failed while running a prompt.
    #[error("provider error: {0}")]
    Provider(String),

    /// A cache value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration is missing or malformed.
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PoolError {
    /// Whether the caller may retry the same operation after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::PoolExhausted { .. })
    }
}

fn wait_reason(model_busy: &bool, capacity: &usize) -> String {
    if *model_busy {
        "its agent is checked out by another caller".to_string()
    } else {
        format!("all {} slots checked out", capacity)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_exhaustion_is_retryable() {
        let exhausted = PoolError::PoolExhausted {
            model_id: "openai:gpt-4o".into(),
            capacity: 2,
            waited: Duration::from_millis(50),
            model_busy: false,
        };
        assert!(exhausted.is_retryable());
        assert!(!PoolError::InvalidRelease("lease 7".into()).is_retryable());
        assert!(!PoolError::Provider("boom".into()).is_retryable());
        assert!(!PoolError::Construction {
            model_id: "x".into(),
            reason: "no key".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_exhausted_display_names_the_wait() {
        let full = PoolError::PoolExhausted {
            model_id: "openai:a".into(),
            capacity: 3,
            waited: Duration::from_millis(10),
            model_busy: false,
        };
        assert!(full.to_string().contains("all 3 slots checked out"));

        let busy = PoolError::PoolExhausted {
            model_id: "openai:a".into(),
            capacity: 3,
            waited: Duration::from_millis(10),
            model_busy: true,
        };
        let msg = busy.to_string();
        assert!(msg.contains("openai:a"));
        assert!(msg.contains("checked out by another caller"));
        assert!(!msg.contains("slots"));
    }

    #[test]
    fn test_error_display_includes_model() {
        let err = PoolError::Construction {
            model_id: "anthropic:claude-3".into(),
            reason: "Anthropic API key not configured".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("anthropic:claude-3"));
        assert!(msg.contains("API key"));
    }
}
