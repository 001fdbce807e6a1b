//! HTTP plumbing shared by the reqwest-based adapters: client construction,
//! status classification and envelope decoding.

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::types::{ProviderError, RawOutput, truncate_chars};
use crate::config::{ConfigError, ProviderSettings};

/// Longest error body excerpt kept in an error message.
const ERROR_DETAIL_CHARS: usize = 300;

/// Build the shared client. One client per adapter, reused for every call.
pub(crate) fn build_client(provider: &str) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .user_agent(concat!("pathwise/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ConfigError::misconfigured(provider, format!("HTTP client: {e}")))
}

/// Settings checks common to every adapter.
pub(crate) fn check_settings(provider: &str, settings: &ProviderSettings) -> Result<(), ConfigError> {
    if settings.model.trim().is_empty() {
        return Err(ConfigError::misconfigured(provider, "model is not set"));
    }
    if !(0.0..=2.0).contains(&settings.temperature) {
        return Err(ConfigError::misconfigured(
            provider,
            format!("temperature {} is outside 0.0..=2.0", settings.temperature),
        ));
    }
    if settings.max_output_tokens == 0 {
        return Err(ConfigError::misconfigured(provider, "max output tokens must be positive"));
    }
    if settings.timeout.is_zero() {
        return Err(ConfigError::misconfigured(provider, "timeout must be positive"));
    }
    Ok(())
}

/// Configured base URL or the backend default, without a trailing slash.
pub(crate) fn base_url(settings: &ProviderSettings, default: &str) -> String {
    settings
        .base_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

/// Send a prepared request and return the body of a 2xx response.
pub(crate) async fn send(
    provider: &'static str,
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<String, ProviderError> {
    let started = Instant::now();
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(classify_transport)?;

    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await.map_err(classify_transport)?;
    tracing::debug!(
        provider,
        status = status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        body_bytes = body.len(),
        "upstream responded"
    );

    if status.is_success() {
        Ok(body)
    } else {
        Err(classify_status(status, retry_after, &body))
    }
}

/// Decode a 2xx body into the backend's envelope type.
pub(crate) fn decode_envelope<T: DeserializeOwned>(body: &str) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::MalformedUpstreamResponse {
        message: format!("unexpected response envelope: {e}"),
        raw: Some(body.to_string()),
    })
}

/// Content from a JSON-mode backend: structured when it already is a JSON
/// object, text otherwise.
pub(crate) fn json_or_text(model: &str, content: String) -> RawOutput {
    match serde_json::from_str::<Value>(&content) {
        Ok(value @ Value::Object(_)) => RawOutput::structured(model, value),
        _ => RawOutput::text(model, content),
    }
}

/// Map a non-2xx status to a provider error.
pub fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> ProviderError {
    let message = format!("HTTP {}: {}", status.as_u16(), error_detail(body));
    match status.as_u16() {
        401 | 403 => ProviderError::Authentication { message },
        429 => ProviderError::RateLimited { retry_after },
        408 | 504 => ProviderError::Timeout { message },
        500..=599 => ProviderError::Unavailable { message },
        _ => ProviderError::Rejected { message },
    }
}

/// Map a transport failure. URLs are stripped so query strings never reach
/// logs.
pub fn classify_transport(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            message: "no response before the deadline".to_string(),
        }
    } else {
        ProviderError::Unavailable {
            message: err.without_url().to_string(),
        }
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Best human-readable part of an error body.
fn error_detail(body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        let error = value.get("error")?;
        error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .map(str::to_string)
    });
    let detail = from_json.unwrap_or_else(|| body.trim().to_string());
    if detail.is_empty() {
        "empty response body".to_string()
    } else {
        truncate_chars(&detail, ERROR_DETAIL_CHARS)
    }
}
