//! The `RoadmapProvider` trait -- the capability contract every LLM backend
//! satisfies.
//!
//! The trait is object-safe so the factory can hand out
//! `Arc<dyn RoadmapProvider>` and the orchestrator can share one adapter
//! across concurrent requests.

use std::time::Duration;

use async_trait::async_trait;

use super::types::{ModelInfo, ProviderError, RawOutput};
use crate::prompt::PromptPayload;

/// Given a prompt payload, return raw generated text or structured content
/// within a timeout, using a declared model identifier.
///
/// Implementations hold no per-call mutable state: `generate` may run
/// concurrently from many tasks.
#[async_trait]
pub trait RoadmapProvider: Send + Sync {
    /// Registry name of the backend (e.g. "openai").
    fn name(&self) -> &str;

    /// Model identifier requests are sent with.
    fn model(&self) -> &str;

    /// Static description of the configured model.
    fn model_info(&self) -> ModelInfo;

    /// Send one prompt and return the backend's raw answer.
    ///
    /// `timeout` bounds the whole HTTP exchange. Errors are classified so
    /// the caller can decide whether to retry.
    async fn generate(
        &self,
        prompt: &PromptPayload,
        timeout: Duration,
    ) -> Result<RawOutput, ProviderError>;
}

// Compile-time assertion: RoadmapProvider must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn RoadmapProvider) {}
};
