//! Shared test utilities for pathwise integration tests.
//!
//! - [`ScriptedProvider`]: a [`RoadmapProvider`] that replays a queue of
//!   canned answers and records every prompt it receives.
//! - [`CountingStore`] / [`FailingStore`]: stores that report how often
//!   they were consulted.
//! - fixtures for roadmaps and requests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use pathwise_core::prompt::{PromptKind, PromptPayload};
use pathwise_core::provider::{ModelInfo, ProviderError, RawOutput, RoadmapProvider};
use pathwise_core::schema::{
    ExperienceLevel, GenerationRequest, Roadmap, SkillAssessment, UpdateRequest, validate_roadmap,
};
use pathwise_core::store::{InMemoryRoadmapStore, RoadmapStore, StoreError};

// ===========================================================================
// Scripted provider
// ===========================================================================

/// One queued answer, optionally delivered after a delay.
#[derive(Debug, Clone)]
pub struct Step {
    pub delay: Option<Duration>,
    pub result: Result<RawOutput, ProviderError>,
}

/// A prompt as the scripted provider saw it.
#[derive(Debug, Clone)]
pub struct RecordedPrompt {
    pub kind: PromptKind,
    pub context: Value,
    pub user_text: String,
}

/// Provider that answers from a script.
///
/// When the script runs out every further call fails with
/// [`ProviderError::Unavailable`].
#[derive(Debug)]
pub struct ScriptedProvider {
    model: String,
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicU32,
    prompts: Mutex<Vec<RecordedPrompt>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            model: "scripted-1".to_string(),
            steps: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a text answer.
    pub fn then_text(self, text: impl Into<String>) -> Self {
        let output = RawOutput::text(self.model.clone(), text);
        self.then(Ok(output))
    }

    /// Queue an answer from a native structured-output backend.
    pub fn then_structured(self, value: Value) -> Self {
        let output = RawOutput::structured(self.model.clone(), value);
        self.then(Ok(output))
    }

    pub fn then_error(self, err: ProviderError) -> Self {
        self.then(Err(err))
    }

    pub fn then(self, result: Result<RawOutput, ProviderError>) -> Self {
        self.push(Step {
            delay: None,
            result,
        })
    }

    /// Queue an answer that only arrives after `delay`.
    pub fn then_after(self, delay: Duration, result: Result<RawOutput, ProviderError>) -> Self {
        self.push(Step {
            delay: Some(delay),
            result,
        })
    }

    fn push(self, step: Step) -> Self {
        self.steps.lock().expect("script lock poisoned").push_back(step);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<RecordedPrompt> {
        self.prompts.lock().expect("prompt lock poisoned").clone()
    }

    pub fn prompt_kinds(&self) -> Vec<PromptKind> {
        self.prompts().into_iter().map(|p| p.kind).collect()
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoadmapProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "scripted".to_string(),
            model: self.model.clone(),
            max_output_tokens: 8192,
            temperature: 0.0,
            capabilities: vec!["json_mode".to_string()],
        }
    }

    async fn generate(
        &self,
        prompt: &PromptPayload,
        _timeout: Duration,
    ) -> Result<RawOutput, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("prompt lock poisoned")
            .push(RecordedPrompt {
                kind: prompt.kind,
                context: prompt.context.clone(),
                user_text: prompt.user_text(),
            });

        let step = self.steps.lock().expect("script lock poisoned").pop_front();
        let Some(step) = step else {
            return Err(ProviderError::Unavailable {
                message: "script exhausted".to_string(),
            });
        };
        if let Some(delay) = step.delay {
            tokio::time::sleep(delay).await;
        }
        step.result
    }
}

// ===========================================================================
// Stores
// ===========================================================================

/// In-memory store that counts lookups.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: InMemoryRoadmapStore,
    fetches: AtomicU32,
}

impl CountingStore {
    pub fn new(roadmaps: impl IntoIterator<Item = Roadmap>) -> Self {
        let mut inner = InMemoryRoadmapStore::new();
        for roadmap in roadmaps {
            inner.insert(roadmap);
        }
        Self {
            inner,
            fetches: AtomicU32::new(0),
        }
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoadmapStore for CountingStore {
    async fn fetch_roadmap(&self, id: &str) -> Result<Roadmap, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_roadmap(id).await
    }
}

/// Store whose backend is always down.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl RoadmapStore for FailingStore {
    async fn fetch_roadmap(&self, id: &str) -> Result<Roadmap, StoreError> {
        Err(anyhow::anyhow!("connection refused").context(format!("loading roadmap {id}")).into())
    }
}

// ===========================================================================
// Fixtures
// ===========================================================================

/// A valid roadmap object with `modules` modules of 10 hours each.
pub fn roadmap_json(modules: usize) -> Value {
    let weeks = modules.max(1);
    let modules: Vec<Value> = (1..=modules).map(module_json).collect();
    json!({
        "title": "Python for backend development",
        "career_goal": "Learn Python",
        "estimated_weeks": weeks,
        "difficulty_progression": "beginner -> intermediate",
        "modules": modules
    })
}

/// Module number `n` of [`roadmap_json`].
pub fn module_json(n: usize) -> Value {
    let prerequisites: Vec<String> = if n > 1 {
        vec![format!("module-{}", n - 1)]
    } else {
        Vec::new()
    };
    json!({
        "id": format!("module-{n}"),
        "title": format!("Python part {n}"),
        "description": format!("Topics for week {n}"),
        "estimated_hours": 10,
        "skills_taught": [format!("python-{n}")],
        "learning_objectives": [format!("Finish part {n}")],
        "prerequisites": prerequisites,
        "resources": [{
            "title": "The Python Tutorial",
            "type": "documentation",
            "url": "https://docs.python.org/3/tutorial/",
            "duration": "2 hours",
            "difficulty": "beginner",
            "why_recommended": "Official and free"
        }]
    })
}

/// [`roadmap_json`] as compact text, the way a chat backend returns it.
pub fn roadmap_text(modules: usize) -> String {
    roadmap_json(modules).to_string()
}

/// A typed roadmap with a fixed id, as a store would hold it.
pub fn stored_roadmap(id: &str, modules: usize) -> Roadmap {
    let mut value = roadmap_json(modules);
    value["id"] = json!(id);
    value["user_id"] = json!("user-1");
    value["created_at"] = json!("2026-01-05T09:30:00Z");
    validate_roadmap(&value).expect("fixture roadmap is valid")
}

pub fn generation_request(goal: &str) -> GenerationRequest {
    GenerationRequest {
        user_goal: goal.to_string(),
        user_skills: vec![SkillAssessment {
            skill: "html".to_string(),
            score: 6,
            level: ExperienceLevel::Intermediate,
        }],
        experience_level: ExperienceLevel::Beginner,
        preferences: Default::default(),
        user_id: "user-1".to_string(),
    }
}

pub fn update_request(roadmap_id: &str, prompt: &str, existing: Option<Roadmap>) -> UpdateRequest {
    UpdateRequest {
        roadmap_id: roadmap_id.to_string(),
        user_prompt: prompt.to_string(),
        existing_roadmap: existing,
        user_id: "user-1".to_string(),
    }
}
