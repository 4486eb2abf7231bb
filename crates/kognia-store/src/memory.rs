use crate::store::{next_message_time, now, Claim, JobStore};
use async_trait::async_trait;
use kognia_core::{
    FailureReason, Job, JobStatus, KogniaError, KogniaResult, Message, Report, Role, Session,
};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, Job>,
    /// Job ids in insertion order.
    order: Vec<Uuid>,
    sessions: HashMap<Uuid, Session>,
    messages: HashMap<Uuid, Vec<Message>>,
    /// Keyed by job id.
    reports: HashMap<Uuid, Report>,
    cancellations: HashSet<Uuid>,
}

impl State {
    fn job_mut(&mut self, job_id: Uuid) -> KogniaResult<&mut Job> {
        self.jobs
            .get_mut(&job_id)
            .ok_or(KogniaError::JobNotFound(job_id))
    }
}

/// Process-local store. Used by tests and single-shot runs.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn create_job(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        prompt: &str,
    ) -> KogniaResult<Job> {
        let mut job = Job::new(user_id, session_id, prompt);
        job.created_at = now();
        job.updated_at = job.created_at;
        let mut state = self.state.lock().await;
        state.order.push(job.id);
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: Uuid) -> KogniaResult<Option<Job>> {
        Ok(self.state.lock().await.jobs.get(&job_id).cloned())
    }

    async fn list_pending_jobs(&self, limit: usize) -> KogniaResult<Vec<Job>> {
        let state = self.state.lock().await;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.jobs.get(id))
            .filter(|job| job.status == JobStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn claim_job(&self, job_id: Uuid) -> KogniaResult<Claim> {
        let mut state = self.state.lock().await;
        let job = state.job_mut(job_id)?;
        if job.status != JobStatus::Pending {
            return Ok(Claim::NotClaimable(job.status));
        }
        job.status = job.status.transition(JobStatus::Processing)?;
        job.updated_at = now();
        Ok(Claim::Acquired(job.clone()))
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        report_content: Option<&str>,
        agent_messages: &[String],
    ) -> KogniaResult<Option<Report>> {
        let mut state = self.state.lock().await;
        let job = state.job_mut(job_id)?;
        job.status = job.status.transition(JobStatus::Completed)?;
        job.updated_at = now();
        let (user_id, session_id) = (job.user_id, job.session_id);

        let report = report_content.map(|content| {
            let mut report = Report::new(job_id, user_id, content);
            report.created_at = now();
            report
        });
        if let Some(report) = &report {
            state.reports.insert(job_id, report.clone());
        }
        let log = state.messages.entry(session_id).or_default();
        for content in agent_messages {
            let mut message = Message::new(session_id, user_id, Role::Agent, content.clone());
            message.created_at = next_message_time(log.last().map(|m| m.created_at));
            log.push(message);
        }
        Ok(report)
    }

    async fn fail_job(&self, job_id: Uuid, reason: &FailureReason) -> KogniaResult<()> {
        let mut state = self.state.lock().await;
        let job = state.job_mut(job_id)?;
        job.status = job.status.transition(JobStatus::Failed)?;
        job.updated_at = now();
        job.failure_reason = Some(reason.clone());
        Ok(())
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        role: Role,
        content: &str,
    ) -> KogniaResult<Message> {
        let mut state = self.state.lock().await;
        let log = state.messages.entry(session_id).or_default();
        let mut message = Message::new(session_id, user_id, role, content);
        message.created_at = next_message_time(log.last().map(|m| m.created_at));
        log.push(message.clone());
        Ok(message)
    }

    async fn get_recent_context(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> KogniaResult<Vec<Message>> {
        let state = self.state.lock().await;
        let Some(log) = state.messages.get(&session_id) else {
            return Ok(Vec::new());
        };
        let start = log.len().saturating_sub(limit);
        Ok(log[start..].to_vec())
    }

    async fn get_report_for_job(&self, job_id: Uuid) -> KogniaResult<Option<Report>> {
        Ok(self.state.lock().await.reports.get(&job_id).cloned())
    }

    async fn latest_report_for_session(&self, session_id: Uuid) -> KogniaResult<Option<Report>> {
        let state = self.state.lock().await;
        Ok(state
            .reports
            .values()
            .filter(|r| {
                state
                    .jobs
                    .get(&r.job_id)
                    .is_some_and(|job| job.session_id == session_id)
            })
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn get_session(&self, session_id: Uuid) -> KogniaResult<Option<Session>> {
        Ok(self.state.lock().await.sessions.get(&session_id).cloned())
    }

    async fn ensure_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        title: &str,
    ) -> KogniaResult<Session> {
        let mut state = self.state.lock().await;
        let now = now();
        match state.sessions.get_mut(&session_id) {
            Some(session) if session.user_id != user_id => Err(KogniaError::Store(
                "session belongs to another user".to_string(),
            )),
            Some(session) => {
                session.title = title.to_string();
                session.updated_at = now;
                Ok(session.clone())
            }
            None => {
                let session = Session {
                    id: session_id,
                    user_id,
                    title: title.to_string(),
                    created_at: now,
                    updated_at: now,
                };
                state.sessions.insert(session_id, session.clone());
                Ok(session)
            }
        }
    }

    async fn request_cancellation(&self, job_id: Uuid) -> KogniaResult<bool> {
        let mut state = self.state.lock().await;
        let terminal = state.job_mut(job_id)?.status.is_terminal();
        if terminal {
            return Ok(false);
        }
        state.cancellations.insert(job_id);
        Ok(true)
    }

    async fn is_cancellation_requested(&self, job_id: Uuid) -> KogniaResult<bool> {
        Ok(self.state.lock().await.cancellations.contains(&job_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_claim_leaves_job_untouched() {
        let store = InMemoryStore::new();
        let job = store
            .create_job(Uuid::new_v4(), Uuid::new_v4(), "prompt")
            .await
            .unwrap();
        store.claim_job(job.id).await.unwrap();
        let before = store.get_job(job.id).await.unwrap().unwrap();

        let second = store.claim_job(job.id).await.unwrap();
        assert_eq!(second, Claim::NotClaimable(JobStatus::Processing));
        assert_eq!(store.get_job(job.id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_complete_requires_processing() {
        let store = InMemoryStore::new();
        let job = store
            .create_job(Uuid::new_v4(), Uuid::new_v4(), "prompt")
            .await
            .unwrap();
        let err = store
            .complete_job(job.id, Some("report"), &["report".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, KogniaError::InvalidTransition { .. }));
        assert!(store.get_report_for_job(job.id).await.unwrap().is_none());
        assert!(store
            .get_recent_context(job.session_id, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.claim_job(id).await,
            Err(KogniaError::JobNotFound(_))
        ));
        assert!(store.get_job(id).await.unwrap().is_none());
    }
}
