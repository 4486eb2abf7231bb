use crate::compactor::CompactorConfig;
use crate::retry::RetryPolicy;
use crate::router::RouterConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker pool settings, read from `[executor]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Upper bound on jobs in `processing` held by this executor.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Deadline for a single specialist attempt.
    #[serde(default = "default_invocation_timeout_ms")]
    pub invocation_timeout_ms: u64,
    /// Session messages read for routing and compaction.
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_invocation_timeout_ms() -> u64 {
    120_000
}

fn default_context_messages() -> usize {
    10
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            invocation_timeout_ms: default_invocation_timeout_ms(),
            context_messages: default_context_messages(),
        }
    }
}

impl ExecutorConfig {
    /// Per-attempt deadline.
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }
}

/// Everything the orchestration core is configured with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// `[executor]`
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// `[retry]`
    #[serde(default)]
    pub retry: RetryPolicy,
    /// `[compactor]`
    #[serde(default)]
    pub compactor: CompactorConfig,
    /// `[router]`
    #[serde(default)]
    pub router: RouterConfig,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: OrchestratorConfig = toml::from_str("").unwrap();
        assert_eq!(config.executor.max_concurrent_jobs, 4);
        assert_eq!(config.executor.invocation_timeout(), Duration::from_secs(120));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.compactor.conversation_window, 5);
        assert!(!config.router.include_briefing);
    }

    #[test]
    fn test_partial_sections() {
        let config: OrchestratorConfig = toml::from_str(
            r#"
[executor]
max_concurrent_jobs = 2

[retry]
backoff_base_ms = 0

[router]
include_briefing = true
"#,
        )
        .unwrap();
        assert_eq!(config.executor.max_concurrent_jobs, 2);
        assert_eq!(config.executor.context_messages, 10);
        assert_eq!(config.retry.backoff_base_ms, 0);
        assert_eq!(config.retry.backoff_max_ms, 30_000);
        assert!(config.router.include_briefing);
    }
}
