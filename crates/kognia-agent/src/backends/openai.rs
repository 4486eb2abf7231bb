use super::{CompletionRequest, LlmBackend};
use crate::config::{LlmProvider, ModelConfig};
use async_trait::async_trait;
use kognia_core::SpecialistError;
use reqwest::StatusCode;
use std::time::Duration;

/// OpenAI-compatible chat completions backend.
///
/// Works with OpenAI, OpenRouter, Gemini's OpenAI surface, and any other
/// provider exposing `POST {base}/chat/completions`.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    /// Build a backend with an HTTP client honouring the request timeout.
    pub fn new(config: ModelConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self { config, http }
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");

        if matches!(self.config.provider, LlmProvider::OpenRouter) {
            request.header("X-Title", "Kognia")
        } else {
            request
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, SpecialistError> {
        let url = self.config.chat_completions_url();
        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": request.temperature.unwrap_or(self.config.temperature),
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
        });

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(classify_status(status, &error_body));
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SpecialistError::InvalidOutput(format!("Malformed response: {e}")))?;
        parse_completion(&resp_body)
    }
}

fn classify_transport_error(e: reqwest::Error) -> SpecialistError {
    if e.is_timeout() {
        SpecialistError::ToolTimeout(e.to_string())
    } else {
        SpecialistError::ToolError(e.to_string())
    }
}

/// Map a non-success HTTP status onto the specialist error taxonomy.
///
/// 429 and 5xx are transient; every other 4xx is a request the provider will
/// keep rejecting.
pub fn classify_status(status: StatusCode, body: &str) -> SpecialistError {
    let message = format!("API error {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS {
        SpecialistError::RateLimited(message)
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        SpecialistError::ToolTimeout(message)
    } else if status.is_server_error() {
        SpecialistError::ToolError(message)
    } else {
        SpecialistError::InvalidOutput(message)
    }
}

/// Pull the assistant text out of a chat completions body.
pub fn parse_completion(body: &serde_json::Value) -> Result<String, SpecialistError> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::trim)
        .unwrap_or_default();
    if content.is_empty() {
        return Err(SpecialistError::InvalidOutput(
            "Completion carried no text content".to_string(),
        ));
    }
    Ok(content.to_string())
}
