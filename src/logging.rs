//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events; hosts that do not install
//! their own subscriber can call [`init_logging`] once at startup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{PoolError, Result};

/// Build the filter: `RUST_LOG` wins, otherwise the configured level.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| PoolError::Config(format!("invalid log level '{}': {}", config.level, e)))
}

/// Install a global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };
    installed.map_err(|e| PoolError::Config(format!("logging already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_rejects_bad_level() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let cfg = LoggingConfig {
            level: "agentpool=notalevel".into(),
            ..Default::default()
        };
        assert!(build_filter(&cfg).is_err());
    }

    #[test]
    fn test_build_filter_accepts_directives() {
        let cfg = LoggingConfig {
            level: "warn,agentpool=debug".into(),
            ..Default::default()
        };
        assert!(build_filter(&cfg).is_ok());
    }
}
