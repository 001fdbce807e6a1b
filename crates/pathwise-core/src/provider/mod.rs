//! Provider adapter interface for LLM backends.
//!
//! This module defines the [`RoadmapProvider`] trait every backend
//! implements, the [`RawOutput`] / [`ProviderError`] types it speaks, the
//! concrete reqwest-based adapters, and the [`ProviderFactory`] that picks
//! one at startup.
//!
//! # Architecture
//!
//! ```text
//! CoreConfig
//!     |
//!     v
//! ProviderFactory --create_provider("openai")--> Arc<dyn RoadmapProvider>
//!                                                     |
//! Orchestrator ---- generate(prompt, timeout) --------+
//!                         |
//!                         v
//!                  RawOutput { content, model, truncated, usage }
//!                  | ProviderError { Authentication | RateLimited | Timeout
//!                                  | MalformedUpstreamResponse | Unavailable
//!                                  | Rejected }
//! ```

pub mod google;
pub mod http;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod trait_def;
pub mod types;

pub use google::GoogleProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use registry::{ProviderConstructor, ProviderFactory};
pub use trait_def::RoadmapProvider;
pub use types::{ModelInfo, ProviderError, RawContent, RawOutput, TokenUsage};
