use kognia_core::Capability;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Counters for one specialist capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityMetrics {
    /// Individual attempts, retries included.
    pub invocations: u32,
    /// Attempts beyond the first one.
    pub retries: u32,
    /// Nodes that ended in an error after all attempts.
    pub failures: u32,
    /// Wall time spent in this capability.
    pub duration_ms: u64,
}

/// Job-level counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetrics {
    /// Claims won by this executor.
    pub claimed: u32,
    /// Jobs moved to `completed`.
    pub completed: u32,
    /// Jobs moved to `failed`, cancellations included.
    pub failed: u32,
    /// Failures caused by cancellation.
    pub cancelled: u32,
}

#[derive(Default)]
struct MonitorState {
    capabilities: BTreeMap<Capability, CapabilityMetrics>,
    jobs: JobMetrics,
}

/// Tracks execution metrics for the executor.
#[derive(Clone, Default)]
pub struct ExecutionMonitor {
    state: Arc<RwLock<MonitorState>>,
}

impl ExecutionMonitor {
    /// Empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished plan node.
    pub async fn record_node(
        &self,
        capability: Capability,
        attempts: u32,
        succeeded: bool,
        duration_ms: u64,
    ) {
        let mut state = self.state.write().await;
        let metrics = state.capabilities.entry(capability).or_default();
        metrics.invocations += attempts;
        metrics.retries += attempts.saturating_sub(1);
        if !succeeded {
            metrics.failures += 1;
        }
        metrics.duration_ms += duration_ms;
    }

    /// A job was claimed by this executor.
    pub async fn job_claimed(&self) {
        self.state.write().await.jobs.claimed += 1;
    }

    /// A job reached `completed`.
    pub async fn job_completed(&self) {
        self.state.write().await.jobs.completed += 1;
    }

    /// A job reached `failed`; `cancelled` marks cancellation failures.
    pub async fn job_failed(&self, cancelled: bool) {
        let mut state = self.state.write().await;
        state.jobs.failed += 1;
        if cancelled {
            state.jobs.cancelled += 1;
        }
    }

    /// Metrics of one capability.
    pub async fn capability(&self, capability: Capability) -> CapabilityMetrics {
        let state = self.state.read().await;
        state
            .capabilities
            .get(&capability)
            .cloned()
            .unwrap_or_default()
    }

    /// Job counters.
    pub async fn jobs(&self) -> JobMetrics {
        self.state.read().await.jobs.clone()
    }

    /// Per-capability metrics for every capability seen so far.
    pub async fn snapshot(&self) -> BTreeMap<Capability, CapabilityMetrics> {
        self.state.read().await.capabilities.clone()
    }

    /// Serialize the current metrics as JSON.
    pub async fn to_json(&self) -> serde_json::Value {
        let state = self.state.read().await;
        let capabilities: serde_json::Map<String, serde_json::Value> = state
            .capabilities
            .iter()
            .map(|(cap, metrics)| {
                (
                    cap.as_str().to_string(),
                    serde_json::to_value(metrics).unwrap_or_default(),
                )
            })
            .collect();
        serde_json::json!({
            "capabilities": capabilities,
            "jobs": state.jobs,
        })
    }
}
