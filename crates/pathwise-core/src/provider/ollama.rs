//! Ollama adapter for locally served models (`/api/chat`). No credential.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http;
use super::trait_def::RoadmapProvider;
use super::types::{ModelInfo, ProviderError, RawOutput, TokenUsage};
use crate::config::{ConfigError, ProviderSettings};
use crate::prompt::PromptPayload;

pub const NAME: &str = "ollama";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug)]
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl OllamaProvider {
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ConfigError> {
        http::check_settings(NAME, settings)?;
        Ok(Self {
            client: http::build_client(NAME)?,
            base_url: http::base_url(settings, DEFAULT_BASE_URL),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
    format: &'static str,
    options: Options,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    message: Option<ResponseMessage>,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[async_trait]
impl RoadmapProvider for OllamaProvider {
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
                "chat".to_string(),
                "json_mode".to_string(),
                "local".to_string(),
            ],
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
                Message {
                    role: "system",
                    content: prompt.system_text(),
                },
                Message {
                    role: "user",
                    content: &user_text,
                },
            ],
            stream: false,
            format: "json",
            options: Options {
                temperature: self.temperature,
                num_predict: self.max_output_tokens,
            },
        };

        let started = Instant::now();
        let request = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body);
        let text = http::send(NAME, request, timeout).await?;
        let response: ChatResponse = http::decode_envelope(&text)?;

        let content = match response.message {
            Some(message) if !message.content.trim().is_empty() => message.content,
            _ => {
                return Err(ProviderError::MalformedUpstreamResponse {
                    message: "response message has no content".to_string(),
                    raw: Some(text),
                });
            }
        };

        let model = response.model.unwrap_or_else(|| self.model.clone());
        let mut output = http::json_or_text(&model, content);
        output.truncated = response.done_reason.as_deref() == Some("length");
        output.usage = Some(TokenUsage {
            prompt_tokens: response.prompt_eval_count,
            completion_tokens: response.eval_count,
        });

        tracing::debug!(
            provider = NAME,
            model = %model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            prompt_tokens = ?output.usage.and_then(|u| u.prompt_tokens),
            completion_tokens = ?output.usage.and_then(|u| u.completion_tokens),
            truncated = output.truncated,
            "ollama chat finished"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_no_credential() {
        let provider = OllamaProvider::from_settings(&ProviderSettings::defaults_for(NAME)).unwrap();
        assert_eq!(provider.model(), "llama2");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert!(provider.model_info().capabilities.contains(&"local".to_string()));
    }

    #[test]
    fn request_disables_streaming() {
        let body = ChatRequest {
            model: "llama2",
            messages: vec![],
            stream: false,
            format: "json",
            options: Options {
                temperature: 0.7,
                num_predict: 512,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["format"], "json");
        assert_eq!(json["options"]["num_predict"], 512);
    }
}
