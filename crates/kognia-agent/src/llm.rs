use crate::backends::openai::OpenAiBackend;
use crate::backends::{CompletionRequest, LlmBackend};
use crate::config::ModelConfig;
use kognia_core::SpecialistError;
use std::sync::Arc;

/// LLM client that dispatches to a provider backend.
///
/// Cheap to clone; every specialist holds one.
#[derive(Clone)]
pub struct LlmClient {
    backend: Arc<dyn LlmBackend>,
}

impl LlmClient {
    /// Client for the configured provider.
    pub fn new(config: ModelConfig) -> Self {
        // Every supported provider speaks the OpenAI chat completions dialect.
        Self {
            backend: Arc::new(OpenAiBackend::new(config)),
        }
    }

    /// Create from a pre-built backend (tests, custom providers).
    pub fn from_backend(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// One system + user completion.
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: Option<f32>,
    ) -> Result<String, SpecialistError> {
        let request = CompletionRequest {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            temperature,
        };
        self.backend.complete(&request).await
    }
}
