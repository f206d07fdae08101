//! Configuration for the pool, the cache, provider credentials and logging.
//!
//! Loaded from `~/.agentpool/config.json` (or an explicit path), then
//! overridden by `AGENTPOOL_*` environment variables and provider API keys.
//! Every section is `#[serde(default)]`, so a partial file is valid.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PoolError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pool: PoolConfig,
    pub cache: CacheConfig,
    pub providers: ProviderConfig,
    pub logging: LoggingConfig,
}

/// Agent pool sizing and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of pooled agents (idle + checked out). Clamped to 1.
    pub pool_size: usize,
    /// How long `acquire` waits for a free slot before `PoolExhausted`.
    pub acquire_timeout_ms: u64,
    /// Idle agents older than this are dropped by the maintenance task.
    pub max_idle_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            acquire_timeout_ms: 5_000,
            max_idle_secs: 3_600,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }
}

/// Which request parameters contribute to a cache fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "params")]
pub enum FingerprintParams {
    /// Every parameter passed with the request is part of the key (default).
    #[default]
    All,
    /// Only prompt and model identify a request.
    None,
    /// Only the named parameters are part of the key.
    Only(BTreeSet<String>),
}

/// Response cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether responses are cached at all.
    pub enabled: bool,
    /// Default time-to-live for entries stored without an explicit TTL.
    pub ttl_secs: u64,
    /// Maximum entry count. `None` bounds the cache by TTL only.
    pub max_entries: Option<usize>,
    /// Interval between background cleanup passes.
    pub cleanup_interval_secs: u64,
    /// Fingerprint inputs beyond prompt and model.
    pub fingerprint_params: FingerprintParams,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3_600,
            max_entries: None,
            cleanup_interval_secs: 300,
            fingerprint_params: FingerprintParams::All,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

/// Provider used for bare model names that match no known prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultProvider {
    #[default]
    Openai,
    Gemini,
    Anthropic,
}

/// Default model selection and provider credentials.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub default_model: String,
    pub default_provider: DefaultProvider,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-4o-mini".to_string(),
            default_provider: DefaultProvider::Openai,
            openai_api_key: None,
            gemini_api_key: None,
            anthropic_api_key: None,
        }
    }
}

// Keys stay out of debug output.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("default_model", &self.default_model)
            .field("default_provider", &self.default_provider)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "***"))
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "***"))
            .field(
                "anthropic_api_key",
                &self.anthropic_api_key.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration consumed by [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Configuration directory (`~/.agentpool`).
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".agentpool")
    }

    /// Default config file path.
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from the default path plus `.env` and process environment.
    ///
    /// A missing config file is not an error; defaults are used.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let path = Self::path();
        let mut config = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a JSON config file without applying environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|e| PoolError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Unparseable numeric values are ignored and the existing value kept.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("AGENTPOOL_POOL_SIZE").and_then(|v| v.trim().parse().ok()) {
            self.pool.pool_size = v;
        }
        if let Some(v) = get("AGENTPOOL_ACQUIRE_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
            self.pool.acquire_timeout_ms = v;
        }
        if let Some(v) = get("AGENTPOOL_MAX_IDLE_SECS").and_then(|v| v.trim().parse().ok()) {
            self.pool.max_idle_secs = v;
        }
        if let Some(v) = get("AGENTPOOL_CACHE_TTL_SECS").and_then(|v| v.trim().parse().ok()) {
            self.cache.ttl_secs = v;
        }
        if let Some(v) = get("AGENTPOOL_CACHE_MAX_ENTRIES").and_then(|v| v.trim().parse().ok()) {
            self.cache.max_entries = Some(v);
        }
        if let Some(v) = get("AGENTPOOL_CACHE_ENABLED") {
            self.cache.enabled = matches!(v.trim(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = get("AGENTPOOL_DEFAULT_MODEL") {
            self.providers.default_model = v.trim().to_string();
        }
        if let Some(v) = get("AGENTPOOL_LOG_LEVEL") {
            self.logging.level = v.trim().to_string();
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.providers.openai_api_key = Some(v);
        }
        if let Some(v) = get("GEMINI_API_KEY") {
            self.providers.gemini_api_key = Some(v);
        }
        if let Some(v) = get("ANTHROPIC_API_KEY") {
            self.providers.anthropic_api_key = Some(v);
        }
    }
}
