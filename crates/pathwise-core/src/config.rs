//! Core configuration: which provider is active and how each one is set up.
//!
//! [`CoreConfig`] is built once by the embedding application (the CLI
//! resolves it from flags, environment and its config file) and passed by
//! reference to the provider factory and the orchestrator.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::orchestrator::RetryPolicy;
use crate::schema::HOURS_PER_WEEK;

pub const DEFAULT_PROVIDER: &str = "google";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

/// Default model per built-in provider.
pub fn default_model(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("gpt-3.5-turbo"),
        "google" => Some("gemini-1.5-flash"),
        "ollama" => Some("llama2"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ApiKey
// ---------------------------------------------------------------------------

/// Provider credential. Never printed: `Debug` and `Display` redact it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw secret, for building request headers only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Settings for one provider backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub api_key: Option<ApiKey>,
    pub model: String,
    /// Overrides the backend's default endpoint.
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl ProviderSettings {
    /// Defaults for `provider`; unknown names get an empty model.
    pub fn defaults_for(provider: &str) -> Self {
        Self {
            api_key: None,
            model: default_model(provider).unwrap_or_default().to_string(),
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    /// The credential, if present and non-blank.
    pub fn api_key(&self) -> Option<&ApiKey> {
        self.api_key.as_ref().filter(|key| !key.is_blank())
    }
}

/// Everything the core needs, read once at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    pub active_provider: String,
    pub providers: BTreeMap<String, ProviderSettings>,
    pub retry: RetryPolicy,
    pub hours_per_week: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let providers = ["openai", "google", "ollama"]
            .into_iter()
            .map(|name| (name.to_string(), ProviderSettings::defaults_for(name)))
            .collect();
        Self {
            active_provider: DEFAULT_PROVIDER.to_string(),
            providers,
            retry: RetryPolicy::default(),
            hours_per_week: HOURS_PER_WEEK,
        }
    }
}

impl CoreConfig {
    /// Settings for `name`, falling back to that provider's defaults.
    pub fn settings_for(&self, name: &str) -> ProviderSettings {
        self.providers
            .get(name)
            .cloned()
            .unwrap_or_else(|| ProviderSettings::defaults_for(name))
    }

    /// Replace the settings for `name`.
    pub fn with_provider(mut self, name: &str, settings: ProviderSettings) -> Self {
        self.providers.insert(name.to_string(), settings);
        self
    }

    pub fn with_active(mut self, name: &str) -> Self {
        self.active_provider = name.to_string();
        self
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Startup-time configuration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown provider {name:?} (available: {available})")]
    UnknownProvider { name: String, available: String },

    #[error("provider {provider:?} is misconfigured: {reason}")]
    MisconfiguredProvider { provider: String, reason: String },
}

impl ConfigError {
    pub fn misconfigured(provider: &str, reason: impl Into<String>) -> Self {
        Self::MisconfiguredProvider {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }
}
