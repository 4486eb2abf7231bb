//! LLM access and web research tools for Kognia specialists.
//!
//! A thin, non-streaming chat completions client plus search and fetch
//! tools. Provider and tool failures are classified into
//! [`kognia_core::SpecialistError`] at this boundary; retries are the
//! orchestrator's business.

/// Provider backends.
pub mod backends;
/// Model endpoint configuration.
pub mod config;
/// Backend-agnostic client.
pub mod llm;
/// Search and page fetch tools.
pub mod research;

pub use backends::{CompletionRequest, LlmBackend};
pub use config::{LlmProvider, ModelConfig};
pub use llm::LlmClient;
pub use research::{
    FetchedPage, ResearchEvidence, ResearchToolsConfig, SearchHit, WebResearchTools,
};
