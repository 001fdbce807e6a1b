//! Top-level error taxonomy and the structured failure report handed to
//! callers.

use std::fmt;

use serde::Serialize;

use crate::config::ConfigError;
use crate::parse::ParseError;
use crate::provider::ProviderError;
use crate::schema::ValidationError;
use crate::store::StoreError;

/// Any failure of a generate or update call.
#[derive(Debug, thiserror::Error)]
pub enum RoadmapError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("could not parse provider output: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("roadmap {id:?} not found")]
    NotFound { id: String },

    #[error("roadmap store failed: {message}")]
    Store { message: String },

    #[error("request cancelled")]
    Cancelled,
}

impl From<StoreError> for RoadmapError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => Self::NotFound { id },
            StoreError::Backend(source) => Self::Store {
                message: format!("{source:#}"),
            },
        }
    }
}

/// Machine-readable failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Authentication,
    RateLimited,
    Timeout,
    MalformedResponse,
    Unavailable,
    Rejected,
    Parse,
    Validation,
    NotFound,
    StoreUnavailable,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Configuration => "configuration",
            Self::Authentication => "authentication",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::MalformedResponse => "malformed_response",
            Self::Unavailable => "unavailable",
            Self::Rejected => "rejected",
            Self::Parse => "parse",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::StoreUnavailable => "store_unavailable",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// What the caller should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Advice {
    /// Send the same request again.
    Retry,
    /// Change the request (goal, skills, instruction) first.
    Rephrase,
    /// Back off, then retry.
    Wait,
    /// Retrying will not help.
    Fatal,
}

impl RoadmapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Provider(err) => match err {
                ProviderError::Authentication { .. } => ErrorKind::Authentication,
                ProviderError::RateLimited { .. } => ErrorKind::RateLimited,
                ProviderError::Timeout { .. } => ErrorKind::Timeout,
                ProviderError::MalformedUpstreamResponse { .. } => ErrorKind::MalformedResponse,
                ProviderError::Unavailable { .. } => ErrorKind::Unavailable,
                ProviderError::Rejected { .. } => ErrorKind::Rejected,
            },
            Self::Parse(_) => ErrorKind::Parse,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Store { .. } => ErrorKind::StoreUnavailable,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn advice(&self) -> Advice {
        match self.kind() {
            ErrorKind::RateLimited
            | ErrorKind::Unavailable
            | ErrorKind::Timeout
            | ErrorKind::StoreUnavailable => Advice::Wait,
            ErrorKind::Parse | ErrorKind::MalformedResponse | ErrorKind::Cancelled => Advice::Retry,
            ErrorKind::Validation => Advice::Rephrase,
            ErrorKind::Configuration
            | ErrorKind::Authentication
            | ErrorKind::Rejected
            | ErrorKind::NotFound => Advice::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.advice(), Advice::Retry | Advice::Wait)
    }

    /// Detail lines beyond the summary message.
    pub fn diagnostics(&self) -> Vec<String> {
        match self {
            Self::Parse(err) => err.diagnostics(),
            Self::Validation(err) => err.diagnostics(),
            Self::Provider(ProviderError::MalformedUpstreamResponse { raw: Some(raw), .. }) => {
                vec![format!(
                    "response body: {}",
                    crate::provider::types::truncate_chars(raw, 200)
                )]
            }
            _ => Vec::new(),
        }
    }
}

/// Structured failure carried by an unsuccessful `GenerationResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub kind: ErrorKind,
    pub message: String,
    pub advice: Advice,
    pub diagnostics: Vec<String>,
    pub retryable: bool,
}

impl From<&RoadmapError> for FailureReport {
    fn from(err: &RoadmapError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            advice: err.advice(),
            diagnostics: err.diagnostics(),
            retryable: err.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::schema::{FieldIssue, IssueKind};

    #[test]
    fn provider_errors_map_to_kinds_and_advice() {
        let err = RoadmapError::from(ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        });
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.advice(), Advice::Wait);
        assert!(err.is_retryable());

        let err = RoadmapError::from(ProviderError::Authentication {
            message: "bad key".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.advice(), Advice::Fatal);
        assert!(!err.is_retryable());
    }

    #[test]
    fn store_errors_split_into_not_found_and_backend() {
        let err = RoadmapError::from(StoreError::NotFound { id: "r-9".to_string() });
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "roadmap \"r-9\" not found");

        let err = RoadmapError::from(StoreError::Backend(anyhow::anyhow!("connection reset")));
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert_eq!(err.advice(), Advice::Wait);
    }

    #[test]
    fn failure_report_serializes_snake_case() {
        let err = RoadmapError::from(ValidationError::new(vec![FieldIssue {
            path: "user_goal".to_string(),
            kind: IssueKind::Empty,
            message: "goal must not be empty".to_string(),
        }]));
        let report = FailureReport::from(&err);
        assert_eq!(report.advice, Advice::Rephrase);
        assert_eq!(report.diagnostics, vec!["user_goal: goal must not be empty (empty)"]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "validation");
        assert_eq!(json["advice"], "rephrase");
        assert_eq!(json["retryable"], false);
    }

    #[test]
    fn cancelled_is_retryable() {
        let err = RoadmapError::Cancelled;
        assert_eq!(err.kind().to_string(), "cancelled");
        assert_eq!(err.advice(), Advice::Retry);
    }
}
