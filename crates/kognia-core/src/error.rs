use crate::job::JobStatus;
use thiserror::Error;
use uuid::Uuid;

/// A convenience `Result` alias using [`KogniaError`].
pub type KogniaResult<T> = Result<T, KogniaError>;

/// Top-level error type for the Kognia workspace.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Error, Debug)]
pub enum KogniaError {
    /// A persistence gateway failure (connection, query, constraint).
    #[error("Store error: {0}")]
    Store(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from an outbound HTTP request (e.g. LLM API call).
    #[error("HTTP error: {0}")]
    Http(String),

    /// An error originating from an LLM-backed agent.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error from the orchestration engine (plan shape, deadlock).
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// The job state machine rejected a transition.
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Status the job was in.
        from: JobStatus,
        /// Status that was requested.
        to: JobStatus,
    },

    /// The delegation router could not classify the prompt.
    #[error("Unroutable prompt: {0}")]
    UnroutablePrompt(String),

    /// The referenced job does not exist.
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Typed failure raised by a specialist invocation.
///
/// Retries are decided from [`SpecialistError::is_transient`]; the
/// specialist itself never retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecialistError {
    /// The external tool or model call did not answer in time.
    #[error("tool timeout: {0}")]
    ToolTimeout(String),

    /// The external tool or model call failed (network, 5xx).
    #[error("tool error: {0}")]
    ToolError(String),

    /// The provider signalled a rate limit (HTTP 429).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The output failed a structural check.
    #[error("invalid output: {0}")]
    InvalidOutput(String),
}

impl SpecialistError {
    /// Whether the condition is worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SpecialistError::ToolTimeout(_)
                | SpecialistError::ToolError(_)
                | SpecialistError::RateLimited(_)
        )
    }
}
