//! Roadmap orchestrator: builds prompts, invokes the provider with retries,
//! parses and validates the answer, and stamps metadata.
//!
//! Per request:
//!
//! ```text
//! Received -> PromptBuilt -> ProviderInvoked -> Parsed -> Validated -> Completed
//!                                 ^    |           |
//!                                 |    v           v
//!                             (retry/backoff)  ParseRetry (one reformat call)
//!                                                  |
//!                                                  v
//!                                               Failed
//! ```
//!
//! The orchestrator holds no mutable state; `generate` and `update` take
//! `&self` and may run concurrently against the shared adapter.

pub mod result;
pub mod retry;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{ConfigError, CoreConfig};
use crate::error::RoadmapError;
use crate::parse::{RoadmapDefaults, parse_roadmap};
use crate::prompt::{
    PromptPayload, ROADMAP_CONTRACT, build_generation_prompt, build_reformat_prompt,
    build_update_prompt,
};
use crate::provider::{ProviderError, ProviderFactory, RawOutput, RoadmapProvider};
use crate::schema::{
    GenerationRequest, Roadmap, UpdateRequest, UpdateType, diff_modules,
    validate_generation_request, validate_update_request,
};
use crate::store::RoadmapStore;

pub use result::{GenerationMetadata, GenerationResult};
pub use retry::RetryPolicy;

use result::format_elapsed;
use retry::CallContext;

/// Configuration for the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,
    /// Upper bound for a single provider call.
    pub call_timeout: Duration,
    /// Pace assumed when relating module hours to weeks.
    pub hours_per_week: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_core(&CoreConfig::default())
    }
}

impl OrchestratorConfig {
    /// Retry policy and pacing from `config`, timeout from the active
    /// provider's settings.
    pub fn from_core(config: &CoreConfig) -> Self {
        Self {
            retry: config.retry,
            call_timeout: config
                .settings_for(&config.active_provider.trim().to_lowercase())
                .timeout,
            hours_per_week: config.hours_per_week,
        }
    }
}

/// Generates and revises roadmaps through one provider adapter.
pub struct RoadmapOrchestrator {
    provider: Arc<dyn RoadmapProvider>,
    store: Option<Arc<dyn RoadmapStore>>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for RoadmapOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoadmapOrchestrator")
            .field("provider", &self.provider.name())
            .field("model", &self.provider.model())
            .field("has_store", &self.store.is_some())
            .field("config", &self.config)
            .finish()
    }
}

/// Roadmap produced by the provider plus the model that served it.
struct Produced {
    roadmap: Roadmap,
    model: String,
}

impl RoadmapOrchestrator {
    pub fn new(provider: Arc<dyn RoadmapProvider>, config: OrchestratorConfig) -> Self {
        Self {
            provider,
            store: None,
            config,
        }
    }

    /// Build the active provider through `factory` and wire it up.
    pub fn from_config(factory: &ProviderFactory, config: &CoreConfig) -> Result<Self, ConfigError> {
        let provider = factory.create_active(config)?;
        Ok(Self::new(provider, OrchestratorConfig::from_core(config)))
    }

    /// Attach the store consulted when an update omits `existing_roadmap`.
    pub fn with_store(mut self, store: Arc<dyn RoadmapStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn provider(&self) -> &Arc<dyn RoadmapProvider> {
        &self.provider
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Inbound operations
    // -----------------------------------------------------------------------

    /// Generate a new roadmap. Never fails past this boundary: errors are
    /// reported inside the result.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> GenerationResult {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let mut metadata = GenerationMetadata::new(
            request_id,
            self.provider.name(),
            self.provider.model(),
            UpdateType::Creation,
            Utc::now(),
        );
        tracing::info!(
            request_id = %request_id,
            provider = %self.provider.name(),
            goal = %request.user_goal,
            "generation request received"
        );

        let outcome = self
            .run_generation(request_id, request, cancel, &mut metadata.attempts)
            .await;
        metadata.generation_time = format_elapsed(started.elapsed());
        self.finish(outcome, metadata)
    }

    /// Revise an existing roadmap according to a natural-language
    /// instruction. The returned roadmap keeps the request's `roadmap_id`.
    pub async fn update(&self, request: &UpdateRequest, cancel: &CancellationToken) -> GenerationResult {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let mut metadata = GenerationMetadata::new(
            request_id,
            self.provider.name(),
            self.provider.model(),
            UpdateType::Modification,
            Utc::now(),
        )
        .with_modification_prompt(&request.user_prompt);
        tracing::info!(
            request_id = %request_id,
            provider = %self.provider.name(),
            roadmap_id = %request.roadmap_id,
            "update request received"
        );

        let outcome = self
            .run_update(request_id, request, cancel, &mut metadata)
            .await;
        metadata.generation_time = format_elapsed(started.elapsed());
        self.finish(outcome, metadata)
    }

    // -----------------------------------------------------------------------
    // Pipelines
    // -----------------------------------------------------------------------

    async fn run_generation(
        &self,
        request_id: Uuid,
        request: &GenerationRequest,
        cancel: &CancellationToken,
        attempts: &mut u32,
    ) -> Result<Produced, RoadmapError> {
        validate_generation_request(request)?;

        let prompt = build_generation_prompt(request, self.config.hours_per_week);
        tracing::debug!(request_id = %request_id, "prompt built");

        let defaults = RoadmapDefaults::for_generation(request, self.config.hours_per_week);
        let mut produced = self
            .produce(request_id, &prompt, &defaults, cancel, attempts)
            .await?;

        let roadmap = &mut produced.roadmap;
        roadmap.id = format!("roadmap-{}", Uuid::new_v4());
        roadmap.user_id = request.user_id.clone();
        roadmap.created_at = Some(Utc::now());
        roadmap.updated_at = None;
        Ok(produced)
    }

    async fn run_update(
        &self,
        request_id: Uuid,
        request: &UpdateRequest,
        cancel: &CancellationToken,
        metadata: &mut GenerationMetadata,
    ) -> Result<Produced, RoadmapError> {
        validate_update_request(request)?;
        let existing = self.existing_roadmap(request_id, request, cancel).await?;

        let prompt = build_update_prompt(request, &existing, self.config.hours_per_week);
        tracing::debug!(request_id = %request_id, modules = existing.modules.len(), "prompt built");

        let defaults = RoadmapDefaults::for_update(request, &existing, self.config.hours_per_week);
        let mut produced = self
            .produce(request_id, &prompt, &defaults, cancel, &mut metadata.attempts)
            .await?;

        let roadmap = &mut produced.roadmap;
        roadmap.id = request.roadmap_id.clone();
        roadmap.user_id = defaults.user_id;
        roadmap.created_at = existing.created_at;
        roadmap.updated_at = Some(Utc::now());

        let changes = diff_modules(&existing.modules, &roadmap.modules);
        tracing::info!(
            request_id = %request_id,
            added = changes.added.len(),
            removed = changes.removed.len(),
            changed = changes.changed.len(),
            unchanged = changes.unchanged.len(),
            "roadmap revised"
        );
        metadata.module_changes = Some(changes);
        Ok(produced)
    }

    /// The roadmap to revise: from the request, else from the store.
    async fn existing_roadmap(
        &self,
        request_id: Uuid,
        request: &UpdateRequest,
        cancel: &CancellationToken,
    ) -> Result<Roadmap, RoadmapError> {
        if let Some(existing) = &request.existing_roadmap {
            return Ok(existing.clone());
        }
        let Some(store) = &self.store else {
            tracing::warn!(request_id = %request_id, roadmap_id = %request.roadmap_id, "no existing roadmap and no store attached");
            return Err(RoadmapError::NotFound {
                id: request.roadmap_id.clone(),
            });
        };

        tracing::debug!(request_id = %request_id, roadmap_id = %request.roadmap_id, "fetching roadmap from store");
        tokio::select! {
            _ = cancel.cancelled() => Err(RoadmapError::Cancelled),
            fetched = store.fetch_roadmap(&request.roadmap_id) => fetched.map_err(RoadmapError::from),
        }
    }

    /// Invoke the provider and parse its answer, with one reformat round
    /// when the first answer does not parse.
    async fn produce(
        &self,
        request_id: Uuid,
        prompt: &PromptPayload,
        defaults: &RoadmapDefaults,
        cancel: &CancellationToken,
        attempts: &mut u32,
    ) -> Result<Produced, RoadmapError> {
        let call = CallContext {
            request_id,
            provider: self.provider.as_ref(),
            timeout: self.config.call_timeout,
            policy: &self.config.retry,
            cancel,
        };

        let output = self.salvage(call.invoke(prompt, attempts).await)?;
        let err = match parse_roadmap(&output, defaults) {
            Ok(roadmap) => return Ok(self.accept(request_id, roadmap, output)),
            Err(err) => err,
        };

        tracing::warn!(
            request_id = %request_id,
            error = %err,
            "provider output did not parse, requesting reformat"
        );
        let reformat = build_reformat_prompt(&output.as_text(), &err.diagnostics(), &ROADMAP_CONTRACT);
        let output = self.salvage(call.invoke(&reformat, attempts).await)?;
        match parse_roadmap(&output, defaults) {
            Ok(roadmap) => Ok(self.accept(request_id, roadmap, output)),
            Err(err) => {
                tracing::error!(request_id = %request_id, error = %err, "reformatted output did not parse either");
                Err(err.into())
            }
        }
    }

    /// A malformed envelope that still carries a body goes to the parser.
    fn salvage(&self, result: Result<RawOutput, RoadmapError>) -> Result<RawOutput, RoadmapError> {
        match result {
            Err(RoadmapError::Provider(ProviderError::MalformedUpstreamResponse {
                message,
                raw: Some(raw),
            })) => {
                tracing::warn!(error = %message, "malformed provider response, attempting repair");
                Ok(RawOutput::text(self.provider.model(), raw))
            }
            other => other,
        }
    }

    fn accept(&self, request_id: Uuid, roadmap: Roadmap, output: RawOutput) -> Produced {
        let pacing = roadmap.pacing(self.config.hours_per_week);
        if !pacing.is_consistent() {
            tracing::warn!(
                request_id = %request_id,
                declared_weeks = pacing.declared_weeks,
                implied_weeks = pacing.implied_weeks,
                total_hours = pacing.total_hours,
                "roadmap duration is inconsistent with module hours"
            );
        }
        if output.truncated {
            tracing::warn!(request_id = %request_id, "provider output was truncated but still validated");
        }
        Produced {
            roadmap,
            model: output.model,
        }
    }

    fn finish(
        &self,
        outcome: Result<Produced, RoadmapError>,
        mut metadata: GenerationMetadata,
    ) -> GenerationResult {
        match outcome {
            Ok(produced) => {
                metadata.ai_model = produced.model;
                tracing::info!(
                    request_id = %metadata.request_id,
                    roadmap_id = %produced.roadmap.id,
                    modules = produced.roadmap.modules.len(),
                    attempts = metadata.attempts,
                    generation_time = %metadata.generation_time,
                    "request completed"
                );
                GenerationResult::succeeded(produced.roadmap, metadata)
            }
            Err(err) => {
                tracing::error!(
                    request_id = %metadata.request_id,
                    kind = %err.kind(),
                    attempts = metadata.attempts,
                    error = %err,
                    "request failed"
                );
                GenerationResult::failed(&err, metadata)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;
    use crate::prompt::PromptKind;
    use crate::provider::ModelInfo;
    use crate::schema::ExperienceLevel;

    /// Replays canned responses in order; records the prompt kinds it saw.
    struct Canned {
        responses: Mutex<Vec<Result<RawOutput, ProviderError>>>,
        kinds: Mutex<Vec<PromptKind>>,
        calls: AtomicU32,
    }

    impl Canned {
        fn new(mut responses: Vec<Result<RawOutput, ProviderError>>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                kinds: Mutex::new(Vec::new()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl RoadmapProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        fn model(&self) -> &str {
            "canned-1"
        }

        fn model_info(&self) -> ModelInfo {
            ModelInfo {
                provider: "canned".to_string(),
                model: "canned-1".to_string(),
                max_output_tokens: 0,
                temperature: 0.0,
                capabilities: vec![],
            }
        }

        async fn generate(
            &self,
            prompt: &PromptPayload,
            _timeout: Duration,
        ) -> Result<RawOutput, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.kinds.lock().unwrap().push(prompt.kind);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ProviderError::Unavailable { message: "exhausted".into() }))
        }
    }

    fn roadmap_text() -> String {
        json!({
            "title": "Python",
            "career_goal": "Learn Python",
            "estimated_weeks": 2,
            "modules": [{
                "id": "basics",
                "title": "Basics",
                "description": "Syntax",
                "estimated_hours": 15,
                "skills_taught": ["python"],
                "resources": [{
                    "title": "Tutorial",
                    "type": "documentation",
                    "url": "https://docs.python.org/3/tutorial/",
                    "difficulty": "beginner"
                }]
            }]
        })
        .to_string()
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            user_goal: "Learn Python".to_string(),
            user_skills: vec![],
            experience_level: ExperienceLevel::Beginner,
            preferences: Default::default(),
            user_id: "user-1".to_string(),
        }
    }

    fn orchestrator(provider: Arc<Canned>) -> RoadmapOrchestrator {
        RoadmapOrchestrator::new(provider, OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn generation_stamps_identity_and_metadata() {
        let provider = Canned::new(vec![Ok(RawOutput::text("canned-1-0613", roadmap_text()))]);
        let result = orchestrator(provider.clone())
            .generate(&request(), &CancellationToken::new())
            .await;

        assert!(result.success, "error: {:?}", result.error);
        let roadmap = result.roadmap.unwrap();
        assert!(roadmap.id.starts_with("roadmap-"));
        assert_eq!(roadmap.user_id, "user-1");
        assert!(roadmap.created_at.is_some());
        assert_eq!(result.metadata.ai_provider, "canned");
        assert_eq!(result.metadata.ai_model, "canned-1-0613");
        assert_eq!(result.metadata.attempts, 1);
        assert_eq!(result.metadata.modules_count, Some(1));
        assert_eq!(result.metadata.total_estimated_hours, Some(15));
        assert!(result.metadata.generation_time.ends_with('s'));
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_provider() {
        let provider = Canned::new(vec![]);
        let mut bad = request();
        bad.user_goal = String::new();
        let result = orchestrator(provider.clone())
            .generate(&bad, &CancellationToken::new())
            .await;
        assert_eq!(result.error.unwrap().kind, ErrorKind::Validation);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparseable_output_gets_one_reformat() {
        let provider = Canned::new(vec![
            Ok(RawOutput::text("canned-1", "Sorry, here are some thoughts instead.")),
            Ok(RawOutput::text("canned-1", roadmap_text())),
        ]);
        let result = orchestrator(provider.clone())
            .generate(&request(), &CancellationToken::new())
            .await;
        assert!(result.success);
        assert_eq!(result.metadata.attempts, 2);
        assert_eq!(
            *provider.kinds.lock().unwrap(),
            vec![PromptKind::Generation, PromptKind::Reformat]
        );
    }

    #[tokio::test]
    async fn malformed_envelope_with_body_is_salvaged() {
        let provider = Canned::new(vec![Err(ProviderError::MalformedUpstreamResponse {
            message: "no choices".into(),
            raw: Some(format!("```json\n{}\n```", roadmap_text())),
        })]);
        let result = orchestrator(provider.clone())
            .generate(&request(), &CancellationToken::new())
            .await;
        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.metadata.attempts, 1);
    }

    #[tokio::test]
    async fn update_without_roadmap_or_store_is_not_found() {
        let provider = Canned::new(vec![]);
        let update = UpdateRequest {
            roadmap_id: "roadmap-missing".to_string(),
            user_prompt: "add more SQL".to_string(),
            existing_roadmap: None,
            user_id: "user-1".to_string(),
        };
        let result = orchestrator(provider.clone())
            .update(&update, &CancellationToken::new())
            .await;
        let report = result.error.unwrap();
        assert_eq!(report.kind, ErrorKind::NotFound);
        assert!(!report.retryable);
        assert_eq!(result.metadata.update_type, UpdateType::Modification);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let provider = Canned::new(vec![Ok(RawOutput::text("canned-1", roadmap_text()))]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = orchestrator(provider.clone()).generate(&request(), &cancel).await;
        assert_eq!(result.error.unwrap().kind, ErrorKind::Cancelled);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn config_takes_timeout_from_active_provider() {
        let mut core = CoreConfig::default().with_active("ollama");
        core.providers.get_mut("ollama").unwrap().timeout = Duration::from_secs(90);
        let config = OrchestratorConfig::from_core(&core);
        assert_eq!(config.call_timeout, Duration::from_secs(90));
        assert_eq!(config.retry.max_attempts, 3);
    }
}
