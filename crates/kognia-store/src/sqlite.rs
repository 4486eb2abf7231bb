//! SQLite-backed store.
//!
//! A single connection guarded by a tokio mutex; every query runs inside
//! `spawn_blocking`. Timestamps are stored as fixed-width RFC 3339 strings with
//! microsecond precision so that text ordering equals time ordering.

use crate::store::{next_message_time, now, Claim, JobStore};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use kognia_core::{
    FailureReason, Job, JobStatus, KogniaError, KogniaResult, Message, Report, Role, Session,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    prompt TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
    failure_reason TEXT,
    cancel_requested INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status_created ON jobs(status, created_at);
CREATE INDEX IF NOT EXISTS idx_jobs_session ON jobs(session_id);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY NOT NULL,
    session_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('user', 'agent', 'system')),
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_session_created ON messages(session_id, created_at);

CREATE TABLE IF NOT EXISTS reports (
    id TEXT PRIMARY KEY NOT NULL,
    job_id TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (job_id) REFERENCES jobs(id)
);
"#;

const JOB_COLUMNS: &str =
    "id, user_id, session_id, prompt, status, failure_reason, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, session_id, user_id, role, content, created_at";
const REPORT_COLUMNS: &str = "id, job_id, user_id, content, created_at";
const SESSION_COLUMNS: &str = "id, user_id, title, created_at, updated_at";

/// SQLite implementation of [`JobStore`].
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> KogniaResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path).map_err(store_err)?;
            conn.execute_batch(SCHEMA).map_err(store_err)?;
            Ok::<_, KogniaError>(conn)
        })
        .await
        .map_err(join_err)??;
        tracing::debug!("SQLite store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// A private in-memory database.
    pub async fn open_in_memory() -> KogniaResult<Self> {
        let conn = tokio::task::spawn_blocking(|| {
            let conn = Connection::open_in_memory().map_err(store_err)?;
            conn.execute_batch(SCHEMA).map_err(store_err)?;
            Ok::<_, KogniaError>(conn)
        })
        .await
        .map_err(join_err)??;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> KogniaResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> KogniaResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await
        .map_err(join_err)?
    }
}

fn store_err(e: rusqlite::Error) -> KogniaError {
    KogniaError::Store(e.to_string())
}

fn join_err(e: tokio::task::JoinError) -> KogniaError {
    KogniaError::Store(format!("Task join error: {e}"))
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn get_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion_err(idx, e))
}

fn get_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn get_parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let s: String = row.get(idx)?;
    s.parse::<T>()
        .map_err(|e| conversion_err(idx, std::io::Error::other(e.to_string())))
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let failure_reason: Option<String> = row.get(5)?;
    let failure_reason = failure_reason
        .map(|s| serde_json::from_str::<FailureReason>(&s))
        .transpose()
        .map_err(|e| conversion_err(5, e))?;
    Ok(Job {
        id: get_uuid(row, 0)?,
        user_id: get_uuid(row, 1)?,
        session_id: get_uuid(row, 2)?,
        prompt: row.get(3)?,
        status: get_parsed(row, 4)?,
        failure_reason,
        created_at: get_time(row, 6)?,
        updated_at: get_time(row, 7)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: get_uuid(row, 0)?,
        session_id: get_uuid(row, 1)?,
        user_id: get_uuid(row, 2)?,
        role: get_parsed::<Role>(row, 3)?,
        content: row.get(4)?,
        created_at: get_time(row, 5)?,
    })
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<Report> {
    Ok(Report {
        id: get_uuid(row, 0)?,
        job_id: get_uuid(row, 1)?,
        user_id: get_uuid(row, 2)?,
        content: row.get(3)?,
        created_at: get_time(row, 4)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: get_uuid(row, 0)?,
        user_id: get_uuid(row, 1)?,
        title: row.get(2)?,
        created_at: get_time(row, 3)?,
        updated_at: get_time(row, 4)?,
    })
}

fn load_job(conn: &Connection, job_id: Uuid) -> KogniaResult<Option<Job>> {
    conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
        params![job_id.to_string()],
        job_from_row,
    )
    .optional()
    .map_err(store_err)
}

/// Insert a message with a `created_at` strictly after the session's newest one.
fn insert_message(
    conn: &Connection,
    session_id: Uuid,
    user_id: Uuid,
    role: Role,
    content: &str,
) -> KogniaResult<Message> {
    let last: Option<String> = conn
        .query_row(
            "SELECT MAX(created_at) FROM messages WHERE session_id = ?1",
            params![session_id.to_string()],
            |row| row.get(0),
        )
        .map_err(store_err)?;
    let last = last
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| KogniaError::Store(e.to_string()))?;
    let mut message = Message::new(session_id, user_id, role, content);
    message.created_at = next_message_time(last);
    conn.execute(
        &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        params![
            message.id.to_string(),
            session_id.to_string(),
            user_id.to_string(),
            message.role.as_str(),
            message.content,
            ts(message.created_at),
        ],
    )
    .map_err(store_err)?;
    Ok(message)
}

/// Explain why a conditional status update touched no row.
fn rejected_transition(conn: &Connection, job_id: Uuid, to: JobStatus) -> KogniaError {
    match load_job(conn, job_id) {
        Ok(Some(job)) => KogniaError::InvalidTransition {
            from: job.status,
            to,
        },
        Ok(None) => KogniaError::JobNotFound(job_id),
        Err(e) => e,
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn create_job(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        prompt: &str,
    ) -> KogniaResult<Job> {
        let mut job = Job::new(user_id, session_id, prompt);
        job.created_at = now();
        job.updated_at = job.created_at;
        let row = job.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO jobs (id, user_id, session_id, prompt, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    row.id.to_string(),
                    row.user_id.to_string(),
                    row.session_id.to_string(),
                    row.prompt,
                    row.status.as_str(),
                    ts(row.created_at),
                    ts(row.updated_at),
                ],
            )
            .map_err(store_err)?;
            Ok(())
        })
        .await?;
        Ok(job)
    }

    async fn get_job(&self, job_id: Uuid) -> KogniaResult<Option<Job>> {
        self.with_conn(move |conn| load_job(conn, job_id)).await
    }

    async fn list_pending_jobs(&self, limit: usize) -> KogniaResult<Vec<Job>> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE status = 'pending'
                     ORDER BY created_at, rowid LIMIT ?1"
                ))
                .map_err(store_err)?;
            let jobs = stmt
                .query_map(params![limit as i64], job_from_row)
                .map_err(store_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(store_err)?;
            Ok(jobs)
        })
        .await
    }

    async fn claim_job(&self, job_id: Uuid) -> KogniaResult<Claim> {
        self.with_conn(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE jobs SET status = 'processing', updated_at = ?2
                     WHERE id = ?1 AND status = 'pending'",
                    params![job_id.to_string(), ts(now())],
                )
                .map_err(store_err)?;
            let job = load_job(conn, job_id)?.ok_or(KogniaError::JobNotFound(job_id))?;
            if changed == 1 {
                Ok(Claim::Acquired(job))
            } else {
                Ok(Claim::NotClaimable(job.status))
            }
        })
        .await
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        report_content: Option<&str>,
        agent_messages: &[String],
    ) -> KogniaResult<Option<Report>> {
        let report_content = report_content.map(str::to_owned);
        let agent_messages = agent_messages.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(store_err)?;
            let changed = tx
                .execute(
                    "UPDATE jobs SET status = 'completed', updated_at = ?2
                     WHERE id = ?1 AND status = 'processing'",
                    params![job_id.to_string(), ts(now())],
                )
                .map_err(store_err)?;
            if changed == 0 {
                return Err(rejected_transition(&tx, job_id, JobStatus::Completed));
            }
            let job = load_job(&tx, job_id)?.ok_or(KogniaError::JobNotFound(job_id))?;

            let report = match report_content {
                Some(content) => {
                    let mut report = Report::new(job_id, job.user_id, content);
                    report.created_at = now();
                    tx.execute(
                        &format!("INSERT INTO reports ({REPORT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
                        params![
                            report.id.to_string(),
                            job_id.to_string(),
                            job.user_id.to_string(),
                            report.content,
                            ts(report.created_at),
                        ],
                    )
                    .map_err(store_err)?;
                    Some(report)
                }
                None => None,
            };
            for content in &agent_messages {
                insert_message(&tx, job.session_id, job.user_id, Role::Agent, content)?;
            }
            tx.commit().map_err(store_err)?;
            Ok(report)
        })
        .await
    }

    async fn fail_job(&self, job_id: Uuid, reason: &FailureReason) -> KogniaResult<()> {
        let reason = serde_json::to_string(reason)?;
        self.with_conn(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE jobs SET status = 'failed', failure_reason = ?2, updated_at = ?3
                     WHERE id = ?1 AND status = 'processing'",
                    params![job_id.to_string(), reason, ts(now())],
                )
                .map_err(store_err)?;
            if changed == 0 {
                return Err(rejected_transition(conn, job_id, JobStatus::Failed));
            }
            Ok(())
        })
        .await
    }

    async fn append_message(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        role: Role,
        content: &str,
    ) -> KogniaResult<Message> {
        let content = content.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(store_err)?;
            let message = insert_message(&tx, session_id, user_id, role, &content)?;
            tx.commit().map_err(store_err)?;
            Ok(message)
        })
        .await
    }

    async fn get_recent_context(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> KogniaResult<Vec<Message>> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                ))
                .map_err(store_err)?;
            let mut messages = stmt
                .query_map(
                    params![session_id.to_string(), limit as i64],
                    message_from_row,
                )
                .map_err(store_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(store_err)?;
            messages.reverse();
            Ok(messages)
        })
        .await
    }

    async fn get_report_for_job(&self, job_id: Uuid) -> KogniaResult<Option<Report>> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {REPORT_COLUMNS} FROM reports WHERE job_id = ?1"),
                params![job_id.to_string()],
                report_from_row,
            )
            .optional()
            .map_err(store_err)
        })
        .await
    }

    async fn latest_report_for_session(&self, session_id: Uuid) -> KogniaResult<Option<Report>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT r.id, r.job_id, r.user_id, r.content, r.created_at
                 FROM reports r JOIN jobs j ON j.id = r.job_id
                 WHERE j.session_id = ?1
                 ORDER BY r.created_at DESC, r.rowid DESC LIMIT 1",
                params![session_id.to_string()],
                report_from_row,
            )
            .optional()
            .map_err(store_err)
        })
        .await
    }

    async fn get_session(&self, session_id: Uuid) -> KogniaResult<Option<Session>> {
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![session_id.to_string()],
                session_from_row,
            )
            .optional()
            .map_err(store_err)
        })
        .await
    }

    async fn ensure_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        title: &str,
    ) -> KogniaResult<Session> {
        let title = title.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(store_err)?;
            let existing = tx
                .query_row(
                    &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                    params![session_id.to_string()],
                    session_from_row,
                )
                .optional()
                .map_err(store_err)?;
            let now = now();
            let session = match existing {
                Some(session) if session.user_id != user_id => {
                    return Err(KogniaError::Store(
                        "session belongs to another user".to_string(),
                    ));
                }
                Some(mut session) => {
                    tx.execute(
                        "UPDATE sessions SET title = ?2, updated_at = ?3 WHERE id = ?1",
                        params![session_id.to_string(), title, ts(now)],
                    )
                    .map_err(store_err)?;
                    session.title = title;
                    session.updated_at = now;
                    session
                }
                None => {
                    tx.execute(
                        &format!(
                            "INSERT INTO sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"
                        ),
                        params![
                            session_id.to_string(),
                            user_id.to_string(),
                            title,
                            ts(now),
                            ts(now),
                        ],
                    )
                    .map_err(store_err)?;
                    Session {
                        id: session_id,
                        user_id,
                        title,
                        created_at: now,
                        updated_at: now,
                    }
                }
            };
            tx.commit().map_err(store_err)?;
            Ok(session)
        })
        .await
    }

    async fn request_cancellation(&self, job_id: Uuid) -> KogniaResult<bool> {
        self.with_conn(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE jobs SET cancel_requested = 1
                     WHERE id = ?1 AND status IN ('pending', 'processing')",
                    params![job_id.to_string()],
                )
                .map_err(store_err)?;
            if changed == 0 && load_job(conn, job_id)?.is_none() {
                return Err(KogniaError::JobNotFound(job_id));
            }
            Ok(changed == 1)
        })
        .await
    }

    async fn is_cancellation_requested(&self, job_id: Uuid) -> KogniaResult<bool> {
        self.with_conn(move |conn| {
            let flag: Option<i64> = conn
                .query_row(
                    "SELECT cancel_requested FROM jobs WHERE id = ?1",
                    params![job_id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(store_err)?;
            Ok(flag.unwrap_or(0) != 0)
        })
        .await
    }
}
