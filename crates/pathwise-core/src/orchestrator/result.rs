//! Result envelope returned by the orchestrator.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{FailureReport, RoadmapError};
use crate::schema::{ModuleChanges, Roadmap, UpdateType};

/// Longest prefix of a modification instruction kept in metadata.
const MODIFICATION_PROMPT_CHARS: usize = 100;

/// Facts about how a result was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationMetadata {
    pub request_id: Uuid,
    /// Wall-clock time, formatted like `"1.23s"`.
    pub generation_time: String,
    pub ai_provider: String,
    pub ai_model: String,
    pub update_type: UpdateType,
    pub request_timestamp: DateTime<Utc>,
    /// Provider calls made, reformat calls included.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modules_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_estimated_hours: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modification_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_changes: Option<ModuleChanges>,
}

impl GenerationMetadata {
    pub(crate) fn new(
        request_id: Uuid,
        ai_provider: &str,
        ai_model: &str,
        update_type: UpdateType,
        request_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            generation_time: format_elapsed(Duration::ZERO),
            ai_provider: ai_provider.to_string(),
            ai_model: ai_model.to_string(),
            update_type,
            request_timestamp,
            attempts: 0,
            modules_count: None,
            total_estimated_hours: None,
            modification_prompt: None,
            module_changes: None,
        }
    }

    pub(crate) fn with_modification_prompt(mut self, prompt: &str) -> Self {
        self.modification_prompt = Some(prompt.chars().take(MODIFICATION_PROMPT_CHARS).collect());
        self
    }
}

pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}

/// Outcome of a generate or update call. `roadmap` is present iff `success`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roadmap: Option<Roadmap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureReport>,
    pub metadata: GenerationMetadata,
}

impl GenerationResult {
    pub(crate) fn succeeded(roadmap: Roadmap, mut metadata: GenerationMetadata) -> Self {
        metadata.modules_count = Some(roadmap.modules.len());
        metadata.total_estimated_hours = Some(roadmap.total_hours());
        Self {
            success: true,
            roadmap: Some(roadmap),
            error: None,
            metadata,
        }
    }

    pub(crate) fn failed(err: &RoadmapError, metadata: GenerationMetadata) -> Self {
        Self {
            success: false,
            roadmap: None,
            error: Some(FailureReport::from(err)),
            metadata,
        }
    }

    /// Split into the roadmap or the failure report.
    pub fn into_result(self) -> Result<Roadmap, FailureReport> {
        match (self.roadmap, self.error) {
            (Some(roadmap), _) if self.success => Ok(roadmap),
            (_, Some(report)) => Err(report),
            (_, None) => Err(FailureReport::from(&RoadmapError::Cancelled)),
        }
    }
}
