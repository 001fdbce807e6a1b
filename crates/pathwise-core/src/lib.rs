//! Core library for pathwise: turns a learning goal into a structured,
//! validated roadmap by prompting an LLM provider, and revises existing
//! roadmaps from natural-language instructions.
//!
//! The entry point is [`orchestrator::RoadmapOrchestrator`]. Providers are
//! built through [`provider::ProviderFactory`] from a [`config::CoreConfig`].

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod parse;
pub mod prompt;
pub mod provider;
pub mod schema;
pub mod store;

pub use config::{ConfigError, CoreConfig, ProviderSettings};
pub use error::{Advice, ErrorKind, FailureReport, RoadmapError};
pub use orchestrator::{
    GenerationMetadata, GenerationResult, OrchestratorConfig, RetryPolicy, RoadmapOrchestrator,
};
pub use provider::{ProviderError, ProviderFactory, RawOutput, RoadmapProvider};
pub use schema::{GenerationRequest, Module, Roadmap, UpdateRequest};
pub use store::{InMemoryRoadmapStore, RoadmapStore, StoreError};
