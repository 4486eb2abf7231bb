use serde::{Deserialize, Serialize};

/// Which OpenAI-compatible endpoint family to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Google Gemini through its OpenAI-compatible surface.
    Gemini,
    /// api.openai.com.
    OpenAi,
    /// openrouter.ai.
    OpenRouter,
}

/// Model endpoint settings shared by every specialist.
///
/// Per-capability sampling temperatures live in the specialist profiles;
/// `temperature` here is only the fallback when a request carries none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Endpoint family.
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,
    /// Model name sent with every request.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Empty means "take it from the environment".
    #[serde(default)]
    pub api_key: String,
    /// Overrides the provider default API root.
    pub api_base_url: Option<String>,
    /// Fallback sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// HTTP-level timeout for a single completion request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> LlmProvider {
    LlmProvider::Gemini
}

fn default_model_id() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_temperature() -> f32 {
    0.4
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_request_timeout_secs() -> u64 {
    90
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: String::new(),
            api_base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ModelConfig {
    /// API root, without the `/chat/completions` suffix.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url.trim_end_matches('/')
        } else {
            match self.provider {
                LlmProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
                LlmProvider::OpenAi => "https://api.openai.com/v1",
                LlmProvider::OpenRouter => "https://openrouter.ai/api/v1",
            }
        }
    }

    /// Full chat completions endpoint.
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url())
    }
}
