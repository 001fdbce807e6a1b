//! OpenAI chat-completions adapter (also works against compatible servers
//! via `base_url`).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http;
use super::trait_def::RoadmapProvider;
use super::types::{ModelInfo, ProviderError, RawOutput, TokenUsage};
use crate::config::{ApiKey, ConfigError, ProviderSettings};
use crate::prompt::PromptPayload;

pub const NAME: &str = "openai";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Adapter for `POST /chat/completions` in JSON mode.
#[derive(Debug)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: ApiKey,
    base_url: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl OpenAiProvider {
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        http::check_settings(NAME, settings)?;
        let api_key = settings
            .api_key()
            .cloned()
            .ok_or_else(|| ConfigError::misconfigured(NAME, "API key is not set (OPENAI_API_KEY)"))?;
        Ok(Self {
            client: http::build_client(NAME)?,
            api_key,
            base_url: http::base_url(settings, DEFAULT_BASE_URL),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

#[async_trait]
impl RoadmapProvider for OpenAiProvider {
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
            capabilities: vec!["chat".to_string(), "json_mode".to_string()],
        }
    }

    async fn generate(
        &self,
        prompt: &PromptPayload,
        timeout: Duration,
    ) -> Result<RawOutput, ProviderError> {
        let user_text = prompt.user_text();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt.system_text(),
                },
                ChatMessage {
                    role: "user",
                    content: &user_text,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_output_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let started = Instant::now();
        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose())
            .json(&body);
        let text = http::send(NAME, request, timeout).await?;
        let response: ChatResponse = http::decode_envelope(&text)?;

        let Some(choice) = response.choices.into_iter().next() else {
            return Err(ProviderError::MalformedUpstreamResponse {
                message: "response has no choices".to_string(),
                raw: Some(text),
            });
        };
        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ProviderError::Rejected {
                message: "response blocked by content filter".to_string(),
            });
        }
        let content = match choice.message.content {
            Some(content) if !content.trim().is_empty() => content,
            _ => {
                return Err(ProviderError::MalformedUpstreamResponse {
                    message: "response message has no content".to_string(),
                    raw: Some(text),
                });
            }
        };

        let model = response.model.unwrap_or_else(|| self.model.clone());
        let mut output = http::json_or_text(&model, content);
        output.truncated = choice.finish_reason.as_deref() == Some("length");
        output.usage = response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });

        tracing::debug!(
            provider = NAME,
            model = %model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            prompt_tokens = ?output.usage.and_then(|u| u.prompt_tokens),
            completion_tokens = ?output.usage.and_then(|u| u.completion_tokens),
            truncated = output.truncated,
            "chat completion finished"
        );
        Ok(output)
    }
}
