use crate::capability::Capability;
use crate::error::{KogniaError, KogniaResult, SpecialistError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a [`Job`].
///
/// The persisted vocabulary (`pending | processing | completed | failed`) is
/// polled by external consumers and must not grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, waiting for an executor to claim it.
    Pending,
    /// Claimed by exactly one executor.
    Processing,
    /// Plan finished and artifacts persisted.
    Completed,
    /// Unrecoverable error; `failure_reason` is set.
    Failed,
}

impl JobStatus {
    /// Persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// The only legal edges: `pending -> processing -> {completed, failed}`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    /// Validate a transition, returning the new status.
    pub fn transition(self, next: JobStatus) -> KogniaResult<JobStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(KogniaError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = KogniaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(KogniaError::Store(format!("unknown job status '{other}'"))),
        }
    }
}

/// Enumerable cause of a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No routing rule matched with enough confidence.
    UnroutablePrompt,
    /// A specialist timed out on every attempt.
    ToolTimeout,
    /// A specialist's external call failed on every attempt.
    ToolError,
    /// The provider kept rate limiting the specialist.
    RateLimited,
    /// A specialist returned structurally invalid output.
    InvalidOutput,
    /// An external actor cancelled the job.
    Cancelled,
    /// Persistence or engine fault.
    Internal,
}

impl FailureKind {
    /// Stable snake_case code.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UnroutablePrompt => "unroutable_prompt",
            FailureKind::ToolTimeout => "tool_timeout",
            FailureKind::ToolError => "tool_error",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::InvalidOutput => "invalid_output",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal",
        }
    }
}

impl From<&SpecialistError> for FailureKind {
    fn from(err: &SpecialistError) -> Self {
        match err {
            SpecialistError::ToolTimeout(_) => FailureKind::ToolTimeout,
            SpecialistError::ToolError(_) => FailureKind::ToolError,
            SpecialistError::RateLimited(_) => FailureKind::RateLimited,
            SpecialistError::InvalidOutput(_) => FailureKind::InvalidOutput,
        }
    }
}

/// Structured failure reason recorded on a failed [`Job`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    /// What went wrong.
    pub kind: FailureKind,
    /// The plan node that failed, when the failure came from a specialist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
    /// Human-readable detail (last error message). Not part of the stable code.
    #[serde(default)]
    pub detail: String,
}

impl FailureReason {
    /// Failure raised by a specialist after retries were exhausted (or skipped).
    pub fn specialist(capability: Capability, err: &SpecialistError) -> Self {
        Self {
            kind: FailureKind::from(err),
            capability: Some(capability),
            detail: err.to_string(),
        }
    }

    /// The router could not classify the prompt.
    pub fn unroutable(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::UnroutablePrompt,
            capability: None,
            detail: detail.into(),
        }
    }

    /// The job was cancelled between plan nodes.
    pub fn cancelled() -> Self {
        Self {
            kind: FailureKind::Cancelled,
            capability: None,
            detail: "cancelled".to_string(),
        }
    }

    /// Engine or persistence fault.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Internal,
            capability: None,
            detail: detail.into(),
        }
    }

    /// Stable code, e.g. `research:tool_timeout` or `cancelled`.
    pub fn code(&self) -> String {
        match self.capability {
            Some(cap) => format!("{}:{}", cap.as_str(), self.kind.as_str()),
            None => self.kind.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code(), self.detail)
    }
}

/// A unit of work: one prompt turned into one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: Uuid,
    /// Submitting user.
    pub user_id: Uuid,
    /// Session the job belongs to.
    pub session_id: Uuid,
    /// Free-text request.
    pub prompt: String,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last committed transition.
    pub updated_at: DateTime<Utc>,
    /// Set only when `status == failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

impl Job {
    /// A freshly created job, always `pending`.
    pub fn new(user_id: Uuid, session_id: Uuid, prompt: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            session_id,
            prompt: prompt.into(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            failure_reason: None,
        }
    }
}

/// Groups jobs and messages for one user conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (chosen by the client).
    pub id: Uuid,
    /// Owner of the session.
    pub user_id: Uuid,
    /// Display title, derived from the latest prompt.
    pub title: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last activity.
    pub updated_at: DateTime<Utc>,
}

/// Maximum number of characters of a prompt used as a session title.
pub const SESSION_TITLE_CHARS: usize = 50;

/// Derive a session title from a prompt.
pub fn session_title(prompt: &str) -> String {
    prompt.chars().take(SESSION_TITLE_CHARS).collect()
}

/// The persisted artifact of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Unique report identifier.
    pub id: Uuid,
    /// The job that produced the report (unique).
    pub job_id: Uuid,
    /// Owner of the job.
    pub user_id: Uuid,
    /// Report body, verbatim from the terminal specialist.
    pub content: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Report {
    /// New report for a job.
    pub fn new(job_id: Uuid, user_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            user_id,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// What a poller sees for a job: status plus the artifact or the failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    /// Job identifier.
    pub job_id: Uuid,
    /// Current status.
    pub status: JobStatus,
    /// Report content, present only for completed report-producing jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    /// Stable failure code, present only for failed jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(Uuid::new_v4(), Uuid::new_v4(), "Analyze Brand X");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.failure_reason.is_none());
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn test_legal_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        let all = [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ];
        let mut legal = 0;
        for from in all {
            for to in all {
                if from.can_transition_to(to) {
                    legal += 1;
                } else {
                    assert!(matches!(
                        from.transition(to),
                        Err(KogniaError::InvalidTransition { .. })
                    ));
                }
            }
        }
        assert_eq!(legal, 3);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_vocabulary() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!("cancelled".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_failure_reason_codes() {
        let err = SpecialistError::ToolTimeout("search".into());
        let reason = FailureReason::specialist(Capability::Research, &err);
        assert_eq!(reason.code(), "research:tool_timeout");
        assert_eq!(FailureReason::cancelled().code(), "cancelled");
        assert_eq!(
            FailureReason::unroutable("no rule").code(),
            "unroutable_prompt"
        );
    }

    #[test]
    fn test_failure_reason_serialization() {
        let reason = FailureReason::specialist(
            Capability::SwotEvaluation,
            &SpecialistError::InvalidOutput("missing Threats".into()),
        );
        let json = serde_json::to_string(&reason).unwrap();
        assert!(json.contains("\"invalid_output\""));
        assert!(json.contains("\"swot_evaluation\""));
        let parsed: FailureReason = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, reason);
    }

    #[test]
    fn test_session_title_truncates_on_chars() {
        let prompt = "é".repeat(80);
        assert_eq!(session_title(&prompt).chars().count(), SESSION_TITLE_CHARS);
        assert_eq!(session_title("short"), "short");
    }
}
