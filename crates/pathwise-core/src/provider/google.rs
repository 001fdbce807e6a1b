//! Google Gemini adapter (`models/{model}:generateContent`).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http;
use super::trait_def::RoadmapProvider;
use super::types::{ModelInfo, ProviderError, RawOutput, TokenUsage};
use crate::config::{ApiKey, ConfigError, ProviderSettings};
use crate::prompt::PromptPayload;

pub const NAME: &str = "google";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini rejects larger `maxOutputTokens` values.
pub const MAX_OUTPUT_TOKENS_CAP: u32 = 8192;

#[derive(Debug)]
pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: ApiKey,
    base_url: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GoogleProvider {
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        http::check_settings(NAME, settings)?;
        let api_key = settings
            .api_key()
            .cloned()
            .ok_or_else(|| ConfigError::misconfigured(NAME, "API key is not set (GOOGLE_API_KEY)"))?;
        Ok(Self {
            client: http::build_client(NAME)?,
            api_key,
            base_url: http::base_url(settings, DEFAULT_BASE_URL),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens.min(MAX_OUTPUT_TOKENS_CAP),
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

#[async_trait]
impl RoadmapProvider for GoogleProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: NAME.to_string(),
            model: self.model.clone(),
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
            capabilities: vec![
                "json_mode".to_string(),
                "system_instruction".to_string(),
                "safety_filters".to_string(),
            ],
        }
    }

    async fn generate(
        &self,
        prompt: &PromptPayload,
        timeout: Duration,
    ) -> Result<RawOutput, ProviderError> {
        let user_text = prompt.user_text();
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: prompt.system_text(),
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: &user_text }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
                response_mime_type: "application/json",
            },
        };

        let started = Instant::now();
        let request = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", self.api_key.expose())
            .json(&body);
        let text = http::send(NAME, request, timeout).await?;
        let response: GenerateResponse = http::decode_envelope(&text)?;

        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::Rejected {
                message: format!("prompt blocked: {reason}"),
            });
        }
        let Some(candidate) = response.candidates.into_iter().next() else {
            return Err(ProviderError::MalformedUpstreamResponse {
                message: "response has no candidates".to_string(),
                raw: Some(text),
            });
        };

        let finish_reason = candidate.finish_reason.unwrap_or_default();
        if finish_reason == "SAFETY" {
            return Err(ProviderError::Rejected {
                message: "response blocked by safety filters".to_string(),
            });
        }
        let content: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if content.trim().is_empty() {
            let message = if finish_reason == "MAX_TOKENS" {
                "output token limit reached before any content was produced".to_string()
            } else {
                format!("candidate has no text (finish reason {finish_reason:?})")
            };
            return Err(ProviderError::MalformedUpstreamResponse {
                message,
                raw: Some(text),
            });
        }

        let model = response.model_version.unwrap_or_else(|| self.model.clone());
        let mut output = http::json_or_text(&model, content);
        output.truncated = finish_reason == "MAX_TOKENS";
        output.usage = response.usage_metadata.map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
        });

        tracing::debug!(
            provider = NAME,
            model = %model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            prompt_tokens = ?output.usage.and_then(|u| u.prompt_tokens),
            completion_tokens = ?output.usage.and_then(|u| u.completion_tokens),
            finish_reason = %finish_reason,
            truncated = output.truncated,
            "generateContent finished"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_output_tokens_are_capped() {
        let settings = ProviderSettings {
            api_key: Some(ApiKey::new("g-key")),
            max_output_tokens: 32_000,
            ..ProviderSettings::defaults_for(NAME)
        };
        let provider = GoogleProvider::from_settings(&settings).unwrap();
        assert_eq!(provider.model_info().max_output_tokens, MAX_OUTPUT_TOKENS_CAP);
        assert_eq!(provider.model(), "gemini-1.5-flash");
    }

    #[test]
    fn missing_key_is_misconfiguration() {
        let err = GoogleProvider::from_settings(&ProviderSettings::defaults_for(NAME)).unwrap_err();
        assert!(err.to_string().contains("GOOGLE_API_KEY"), "got: {err}");
    }

    #[test]
    fn request_body_is_camel_case() {
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: "sys" }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: "usr" }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                max_output_tokens: 100,
                response_mime_type: "application/json",
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 100);
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "sys");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
    }
}
