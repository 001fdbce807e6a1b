//! Types shared by every provider adapter.

use std::borrow::Cow;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// What the provider produced, before any parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum RawContent {
    /// Free-form text, possibly wrapped in prose or code fences.
    Text(String),
    /// Content the backend already delivered as JSON.
    Structured(Value),
}

/// Token accounting reported by the backend, when it reports any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

/// Best-effort provider response plus the model that actually served it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    pub content: RawContent,
    pub model: String,
    /// The backend stopped because it hit its output limit.
    pub truncated: bool,
    pub usage: Option<TokenUsage>,
}

impl RawOutput {
    pub fn text(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            content: RawContent::Text(text.into()),
            model: model.into(),
            truncated: false,
            usage: None,
        }
    }

    pub fn structured(model: impl Into<String>, value: Value) -> Self {
        Self {
            content: RawContent::Structured(value),
            model: model.into(),
            truncated: false,
            usage: None,
        }
    }

    /// The content as text (structured content is serialized).
    pub fn as_text(&self) -> Cow<'_, str> {
        match &self.content {
            RawContent::Text(text) => Cow::Borrowed(text),
            RawContent::Structured(value) => Cow::Owned(value.to_string()),
        }
    }

    /// First `max` characters of the content, for logs.
    pub fn preview(&self, max: usize) -> String {
        truncate_chars(&self.as_text(), max)
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Static description of a configured adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub provider: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub capabilities: Vec<String>,
}

/// Failure of a single provider call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Bad or missing credential. Fatal.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    #[error("rate limited by provider{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider call timed out: {message}")]
    Timeout { message: String },

    /// The response envelope could not be understood. `raw` keeps the body
    /// so the parser can still attempt a repair.
    #[error("malformed upstream response: {message}")]
    MalformedUpstreamResponse { message: String, raw: Option<String> },

    /// Network or service failure.
    #[error("provider unavailable: {message}")]
    Unavailable { message: String },

    /// The provider refused the request itself. Fatal.
    #[error("provider rejected the request: {message}")]
    Rejected { message: String },
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(delay) => format!(" (retry after {}s)", delay.as_secs()),
        None => String::new(),
    }
}

impl ProviderError {
    /// Whether the orchestrator may call the provider again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::Unavailable { .. }
        )
    }
}
