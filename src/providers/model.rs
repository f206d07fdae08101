//! Model identifier normalization.
//!
//! Pool entries are keyed by a canonical `provider:model` string so that
//! `"gpt-4o"` and `"openai:gpt-4o"` share one pooled client.

use std::fmt;

use crate::config::{DefaultProvider, ProviderConfig};
use crate::error::{PoolError, Result};

/// Providers the backend knows how to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Anthropic,
}

impl ProviderKind {
    /// Prefix used in canonical model identifiers.
    pub fn prefix(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "google-gla",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "openai" => Some(ProviderKind::OpenAi),
            "google-gla" => Some(ProviderKind::Gemini),
            "anthropic" => Some(ProviderKind::Anthropic),
            _ => None,
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Gemini => "Gemini",
            ProviderKind::Anthropic => "Anthropic",
        }
    }
}

impl From<DefaultProvider> for ProviderKind {
    fn from(p: DefaultProvider) -> Self {
        match p {
            DefaultProvider::Openai => ProviderKind::OpenAi,
            DefaultProvider::Gemini => ProviderKind::Gemini,
            DefaultProvider::Anthropic => ProviderKind::Anthropic,
        }
    }
}

/// A parsed, canonical model identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub name: String,
}

impl ModelSpec {
    /// Parse a canonical `provider:model` identifier.
    pub fn parse(model_id: &str) -> Result<Self> {
        let (prefix, name) = model_id.split_once(':').ok_or_else(|| PoolError::Construction {
            model_id: model_id.to_string(),
            reason: "model identifier is not in provider:model form".to_string(),
        })?;
        let provider = ProviderKind::from_prefix(prefix).ok_or_else(|| PoolError::Construction {
            model_id: model_id.to_string(),
            reason: format!("unsupported model provider '{}'", prefix),
        })?;
        if name.is_empty() {
            return Err(PoolError::Construction {
                model_id: model_id.to_string(),
                reason: "empty model name".to_string(),
            });
        }
        Ok(Self {
            provider,
            name: name.to_string(),
        })
    }

    /// Canonical identifier used as the pool key.
    pub fn id(&self) -> String {
        self.to_string()
    }

    /// Fail unless the provider's API key is configured.
    pub fn require_api_key(&self, providers: &ProviderConfig) -> Result<()> {
        let key = match self.provider {
            ProviderKind::OpenAi => &providers.openai_api_key,
            ProviderKind::Gemini => &providers.gemini_api_key,
            ProviderKind::Anthropic => &providers.anthropic_api_key,
        };
        match key.as_deref() {
            Some(k) if !k.trim().is_empty() => Ok(()),
            _ => Err(PoolError::Construction {
                model_id: self.id(),
                reason: format!("{} API key not configured", self.provider.display_name()),
            }),
        }
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider.prefix(), self.name)
    }
}

/// Turn a caller-supplied model name into a canonical identifier.
///
/// - `None` or blank → the configured default model.
/// - `provider:model` → kept as-is (the provider is validated later).
/// - `gemini*` → `google-gla:`, `gpt*`/`o1*` → `openai:`, `claude*` → `anthropic:`.
/// - Anything else → the configured default provider.
pub fn normalize_model(model: Option<&str>, providers: &ProviderConfig) -> String {
    let raw = model
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(providers.default_model.as_str());

    if raw.contains(':') {
        return raw.to_string();
    }

    let provider = if raw.starts_with("gemini") {
        ProviderKind::Gemini
    } else if raw.starts_with("gpt") || raw.starts_with("o1") {
        ProviderKind::OpenAi
    } else if raw.starts_with("claude") {
        ProviderKind::Anthropic
    } else {
        providers.default_provider.into()
    };
    format!("{}:{}", provider.prefix(), raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_known_families() {
        let cfg = ProviderConfig::default();
        assert_eq!(normalize_model(Some("gpt-4o"), &cfg), "openai:gpt-4o");
        assert_eq!(normalize_model(Some("o1-mini"), &cfg), "openai:o1-mini");
        assert_eq!(
            normalize_model(Some("gemini-2.0-flash"), &cfg),
            "google-gla:gemini-2.0-flash"
        );
        assert_eq!(
            normalize_model(Some("claude-3-5-sonnet"), &cfg),
            "anthropic:claude-3-5-sonnet"
        );
    }

    #[test]
    fn test_normalize_keeps_prefixed() {
        let cfg = ProviderConfig::default();
        assert_eq!(
            normalize_model(Some("anthropic:claude-3-opus"), &cfg),
            "anthropic:claude-3-opus"
        );
    }

    #[test]
    fn test_normalize_defaults() {
        let cfg = ProviderConfig {
            default_provider: DefaultProvider::Gemini,
            ..Default::default()
        };
        assert_eq!(normalize_model(None, &cfg), "openai:gpt-4o-mini");
        assert_eq!(normalize_model(Some("  "), &cfg), "openai:gpt-4o-mini");
        assert_eq!(normalize_model(Some("llama-3"), &cfg), "google-gla:llama-3");
    }

    #[test]
    fn test_parse_roundtrip_and_errors() {
        let parsed = ModelSpec::parse("openai:gpt-4o").unwrap();
        assert_eq!(parsed.provider, ProviderKind::OpenAi);
        assert_eq!(parsed.name, "gpt-4o");
        assert_eq!(parsed.id(), "openai:gpt-4o");

        assert!(ModelSpec::parse("gpt-4o").is_err());
        assert!(ModelSpec::parse("mistral:large").is_err());
        assert!(ModelSpec::parse("openai:").is_err());
    }

    #[test]
    fn test_require_api_key() {
        let mut cfg = ProviderConfig::default();
        let parsed = ModelSpec::parse("anthropic:claude-3").unwrap();
        let err = parsed.require_api_key(&cfg).unwrap_err();
        assert!(err.to_string().contains("Anthropic API key not configured"));

        cfg.anthropic_api_key = Some("sk-ant".into());
        assert!(parsed.require_api_key(&cfg).is_ok());
    }
}
