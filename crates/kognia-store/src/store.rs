use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use kognia_core::{
    FailureReason, Job, JobStatus, JobView, KogniaError, KogniaResult, Message, Report, Role,
    Session,
};
use uuid::Uuid;

/// Outcome of a compare-and-set claim on a pending job.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The caller now owns the job, which is `processing`.
    Acquired(Job),
    /// Someone else got there first, or the job already left `pending`.
    NotClaimable(JobStatus),
}

impl Claim {
    /// The claimed job, if the claim succeeded.
    pub fn acquired(self) -> Option<Job> {
        match self {
            Claim::Acquired(job) => Some(job),
            Claim::NotClaimable(_) => None,
        }
    }
}

/// Persistence gateway for jobs, sessions, messages and reports.
///
/// Implementations must make [`claim_job`](JobStore::claim_job) a
/// compare-and-set against the stored status, and
/// [`complete_job`](JobStore::complete_job) atomic with the report and
/// message inserts.
/// Messages of one session must get strictly increasing `created_at` values.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `pending` job.
    async fn create_job(&self, user_id: Uuid, session_id: Uuid, prompt: &str)
        -> KogniaResult<Job>;

    /// Look up a job.
    async fn get_job(&self, job_id: Uuid) -> KogniaResult<Option<Job>>;

    /// Oldest-first list of `pending` jobs.
    async fn list_pending_jobs(&self, limit: usize) -> KogniaResult<Vec<Job>>;

    /// Move a job from `pending` to `processing` if and only if it is still pending.
    async fn claim_job(&self, job_id: Uuid) -> KogniaResult<Claim>;

    /// Move a `processing` job to `completed`, inserting its report when given
    /// and appending `agent_messages` to the job's session.
    ///
    /// Nothing is written when the transition is rejected.
    async fn complete_job(
        &self,
        job_id: Uuid,
        report_content: Option<&str>,
        agent_messages: &[String],
    ) -> KogniaResult<Option<Report>>;

    /// Move a `processing` job to `failed` with a reason. Never writes a report.
    async fn fail_job(&self, job_id: Uuid, reason: &FailureReason) -> KogniaResult<()>;

    /// Append a message to a session.
    async fn append_message(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        role: Role,
        content: &str,
    ) -> KogniaResult<Message>;

    /// The most recent `limit` messages of a session, oldest first.
    async fn get_recent_context(&self, session_id: Uuid, limit: usize)
        -> KogniaResult<Vec<Message>>;

    /// The report of a completed job.
    async fn get_report_for_job(&self, job_id: Uuid) -> KogniaResult<Option<Report>>;

    /// The newest report produced by any job of a session.
    async fn latest_report_for_session(&self, session_id: Uuid) -> KogniaResult<Option<Report>>;

    /// Look up a session.
    async fn get_session(&self, session_id: Uuid) -> KogniaResult<Option<Session>>;

    /// Create the session, or refresh its title and `updated_at`.
    ///
    /// Fails when the session exists and belongs to another user.
    async fn ensure_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        title: &str,
    ) -> KogniaResult<Session>;

    /// Flag a job for cancellation. Returns `false` when the job is already terminal.
    async fn request_cancellation(&self, job_id: Uuid) -> KogniaResult<bool>;

    /// Whether cancellation was requested for a job.
    async fn is_cancellation_requested(&self, job_id: Uuid) -> KogniaResult<bool>;

    /// Status plus report or failure code, as a poller sees it.
    async fn job_view(&self, job_id: Uuid) -> KogniaResult<JobView> {
        let job = self
            .get_job(job_id)
            .await?
            .ok_or(KogniaError::JobNotFound(job_id))?;
        let report = match job.status {
            JobStatus::Completed => self.get_report_for_job(job_id).await?.map(|r| r.content),
            _ => None,
        };
        let failure = match job.status {
            JobStatus::Failed => job.failure_reason.as_ref().map(FailureReason::code),
            _ => None,
        };
        Ok(JobView {
            job_id,
            status: job.status,
            report,
            failure,
        })
    }
}

/// Current time at the precision every store persists.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Next message timestamp for a session, strictly after `last`.
pub(crate) fn next_message_time(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = now();
    match last {
        Some(last) if now <= last => last + chrono::Duration::microseconds(1),
        _ => now,
    }
}
