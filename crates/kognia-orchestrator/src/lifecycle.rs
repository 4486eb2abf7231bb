use kognia_core::{session_title, FailureReason, Job, KogniaResult, Report};
use kognia_store::{Claim, JobStore};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Job state machine over the persistence gateway.
///
/// Every transition is delegated to the store, which enforces the legal edges
/// (`pending -> processing -> {completed, failed}`) against the persisted
/// status. Nothing here caches a job between calls.
#[derive(Clone)]
pub struct JobLifecycle {
    store: Arc<dyn JobStore>,
}

impl JobLifecycle {
    /// State machine over a store.
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Create (or refresh) the session and enqueue a `pending` job.
    pub async fn submit(&self, user_id: Uuid, session_id: Uuid, prompt: &str) -> KogniaResult<Job> {
        self.store
            .ensure_session(session_id, user_id, &session_title(prompt))
            .await?;
        let job = self.store.create_job(user_id, session_id, prompt).await?;
        info!(job_id = %job.id, session_id = %session_id, "Job submitted");
        Ok(job)
    }

    /// Compare-and-set claim. `None` when the job is no longer pending.
    pub async fn claim(&self, job_id: Uuid) -> KogniaResult<Option<Job>> {
        match self.store.claim_job(job_id).await? {
            Claim::Acquired(job) => {
                info!(job_id = %job_id, "Job claimed");
                Ok(Some(job))
            }
            Claim::NotClaimable(status) => {
                info!(job_id = %job_id, status = %status, "Job not claimable");
                Ok(None)
            }
        }
    }

    /// `processing -> completed`, with the report when the plan produced one.
    ///
    /// `agent_messages` land in the session only if the transition commits.
    pub async fn complete(
        &self,
        job_id: Uuid,
        report: Option<&str>,
        agent_messages: &[String],
    ) -> KogniaResult<Option<Report>> {
        let report = self
            .store
            .complete_job(job_id, report, agent_messages)
            .await?;
        info!(
            job_id = %job_id,
            has_report = report.is_some(),
            messages = agent_messages.len(),
            "Job completed"
        );
        Ok(report)
    }

    /// `processing -> failed`.
    pub async fn fail(&self, job_id: Uuid, reason: &FailureReason) -> KogniaResult<()> {
        self.store.fail_job(job_id, reason).await?;
        warn!(job_id = %job_id, reason = %reason, "Job failed");
        Ok(())
    }

    /// Ask for a job to be cancelled. `false` when it already finished.
    pub async fn cancel(&self, job_id: Uuid) -> KogniaResult<bool> {
        let accepted = self.store.request_cancellation(job_id).await?;
        info!(job_id = %job_id, accepted, "Cancellation requested");
        Ok(accepted)
    }

    /// Whether the job should stop before its next plan node.
    pub async fn cancellation_requested(&self, job_id: Uuid) -> KogniaResult<bool> {
        self.store.is_cancellation_requested(job_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use kognia_core::{JobStatus, KogniaError};
    use kognia_store::InMemoryStore;

    fn lifecycle() -> JobLifecycle {
        JobLifecycle::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_submit_creates_session_and_job() {
        let lc = lifecycle();
        let (user, session) = (Uuid::new_v4(), Uuid::new_v4());
        let prompt = "Give me a full SWOT-backed report on Brand X and its three closest rivals";
        let job = lc.submit(user, session, prompt).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let stored = lc.store().get_session(session).await.unwrap().unwrap();
        assert_eq!(stored.user_id, user);
        assert_eq!(stored.title.chars().count(), 50);
    }

    #[tokio::test]
    async fn test_claim_once() {
        let lc = lifecycle();
        let job = lc
            .submit(Uuid::new_v4(), Uuid::new_v4(), "Analyze Brand X")
            .await
            .unwrap();
        assert!(lc.claim(job.id).await.unwrap().is_some());
        assert!(lc.claim(job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_requires_processing() {
        let lc = lifecycle();
        let job = lc
            .submit(Uuid::new_v4(), Uuid::new_v4(), "Analyze Brand X")
            .await
            .unwrap();
        let messages = vec!["# Report".to_string()];
        let err = lc
            .complete(job.id, Some("# Report"), &messages)
            .await
            .unwrap_err();
        assert!(matches!(err, KogniaError::InvalidTransition { .. }));
        assert!(lc
            .store()
            .get_recent_context(job.session_id, 10)
            .await
            .unwrap()
            .is_empty());

        lc.claim(job.id).await.unwrap();
        let report = lc.complete(job.id, Some("# Report"), &messages).await.unwrap();
        assert_eq!(report.unwrap().content, "# Report");
        let context = lc.store().get_recent_context(job.session_id, 10).await.unwrap();
        assert_eq!(context.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_terminal_job_is_refused() {
        let lc = lifecycle();
        let job = lc
            .submit(Uuid::new_v4(), Uuid::new_v4(), "Analyze Brand X")
            .await
            .unwrap();
        lc.claim(job.id).await.unwrap();
        lc.fail(job.id, &FailureReason::cancelled()).await.unwrap();
        assert!(!lc.cancel(job.id).await.unwrap());
    }
}
