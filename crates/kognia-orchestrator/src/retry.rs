use kognia_core::{Capability, SpecialistError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::warn;
use uuid::Uuid;

/// Type alias for the injectable sleep function used in tests.
#[cfg(test)]
type SleepFn = Box<
    dyn Fn(u64) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

/// Bounded exponential-backoff retry for specialist invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per plan node, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget, no waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn compute_backoff(&self, retry: u32) -> u64 {
        let delay = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(retry));
        delay.min(self.backoff_max_ms)
    }
}

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Final result: the first success, or the last error.
    pub result: Result<T, SpecialistError>,
    /// Attempts actually made.
    pub attempts: u32,
}

/// Drives an operation through the retry policy.
///
/// Only transient errors are retried; `InvalidOutput` ends the loop at once.
pub struct Retrier {
    policy: RetryPolicy,
    /// Injectable sleep function for testing (allows skipping real delays).
    #[cfg(test)]
    sleep_fn: Option<SleepFn>,
}

impl Retrier {
    /// New retrier for a policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            #[cfg(test)]
            sleep_fn: None,
        }
    }

    /// The policy in force.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn do_sleep(&self, ms: u64) {
        #[cfg(test)]
        if let Some(ref f) = self.sleep_fn {
            f(ms).await;
            return;
        }
        if ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
    }

    /// Run `op` (given the 1-based attempt number) until it succeeds, fails
    /// permanently, or the attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, capability: Capability, job_id: Uuid, mut op: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SpecialistError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(e) if !e.is_transient() => {
                    warn!(
                        job_id = %job_id,
                        capability = %capability,
                        attempt,
                        error = %e,
                        "Non-retryable specialist error"
                    );
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt,
                    };
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(
                        job_id = %job_id,
                        capability = %capability,
                        attempts = attempt,
                        error = %e,
                        "Retries exhausted"
                    );
                    return RetryOutcome {
                        result: Err(e),
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    let delay = self.policy.compute_backoff(attempt - 1);
                    warn!(
                        job_id = %job_id,
                        capability = %capability,
                        attempt,
                        delay_ms = delay,
                        error = %e,
                        "Transient specialist error, retrying"
                    );
                    self.do_sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn recording_retrier(policy: RetryPolicy) -> (Retrier, Arc<Mutex<Vec<u64>>>) {
        let delays = Arc::new(Mutex::new(Vec::new()));
        let sink = delays.clone();
        let retrier = Retrier {
            policy,
            sleep_fn: Some(Box::new(move |ms| {
                sink.lock().unwrap().push(ms);
                Box::pin(async {})
            })),
        };
        (retrier, delays)
    }

    #[test]
    fn test_compute_backoff() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_base_ms: 1_000,
            backoff_max_ms: 5_000,
        };
        assert_eq!(policy.compute_backoff(0), 1_000);
        assert_eq!(policy.compute_backoff(1), 2_000);
        assert_eq!(policy.compute_backoff(2), 4_000);
        assert_eq!(policy.compute_backoff(3), 5_000);
        assert_eq!(policy.compute_backoff(60), 5_000);
    }

    #[test]
    fn test_default_policy() {
        let policy: RetryPolicy = toml::from_str("").unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_base_ms, 1_000);
        assert_eq!(policy.backoff_max_ms, 30_000);
    }

    #[tokio::test]
    async fn test_retry_twice_then_succeed() {
        let (retrier, delays) = recording_retrier(RetryPolicy::default());
        let calls = AtomicU32::new(0);
        let outcome = retrier
            .run(Capability::Research, Uuid::new_v4(), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(SpecialistError::ToolError("502".into()))
                    } else {
                        Ok("findings")
                    }
                }
            })
            .await;
        assert_eq!(outcome.result.unwrap(), "findings");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*delays.lock().unwrap(), vec![1_000, 2_000]);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let (retrier, delays) = recording_retrier(RetryPolicy::default());
        let outcome: RetryOutcome<()> = retrier
            .run(Capability::Research, Uuid::new_v4(), |attempt| async move {
                Err(SpecialistError::ToolTimeout(format!("attempt {attempt}")))
            })
            .await;
        assert_eq!(outcome.attempts, 3);
        assert_eq!(
            outcome.result.unwrap_err(),
            SpecialistError::ToolTimeout("attempt 3".into())
        );
        assert_eq!(delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_output_not_retried() {
        let (retrier, delays) = recording_retrier(RetryPolicy::default());
        let outcome: RetryOutcome<()> = retrier
            .run(Capability::SwotEvaluation, Uuid::new_v4(), |_| async {
                Err(SpecialistError::InvalidOutput("no threats".into()))
            })
            .await;
        assert_eq!(outcome.attempts, 1);
        assert!(delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let retrier = Retrier::new(RetryPolicy::immediate(2));
        let outcome = retrier
            .run(Capability::Research, Uuid::new_v4(), |attempt| async move {
                if attempt == 1 {
                    Err(SpecialistError::RateLimited("429".into()))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(outcome.result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let retrier = Retrier::new(RetryPolicy::immediate(0));
        let outcome = retrier
            .run(Capability::Research, Uuid::new_v4(), |_| async { Ok(()) })
            .await;
        assert_eq!(outcome.attempts, 1);
    }
}
