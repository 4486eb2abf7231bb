/// OpenAI-compatible HTTP backend.
pub mod openai;

use async_trait::async_trait;
use kognia_core::SpecialistError;

/// A single-shot completion request: one system prompt, one user turn.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Role instructions.
    pub system_prompt: String,
    /// Task payload.
    pub user_prompt: String,
    /// Overrides the configured default when set.
    pub temperature: Option<f32>,
}

/// Trait for LLM provider backends.
///
/// Failures come back already classified as [`SpecialistError`] so that the
/// caller can decide on retries without inspecting transport details.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Non-streaming chat completion returning the assistant text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, SpecialistError>;
}
