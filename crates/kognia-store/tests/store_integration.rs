#![allow(clippy::unwrap_used, clippy::expect_used)]

use kognia_core::{FailureReason, JobStatus, KogniaError, Role};
use kognia_store::{Claim, InMemoryStore, JobStore, SqliteStore};
use std::sync::Arc;
use uuid::Uuid;

/// Every contract check runs against both implementations.
async fn stores() -> Vec<(&'static str, Arc<dyn JobStore>)> {
    vec![
        ("memory", Arc::new(InMemoryStore::new()) as Arc<dyn JobStore>),
        (
            "sqlite",
            Arc::new(SqliteStore::open_in_memory().await.unwrap()) as Arc<dyn JobStore>,
        ),
    ]
}

// ---------------------------------------------------------------------------
// 1. New jobs start pending and appear in the pending list in order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn created_jobs_are_pending_in_order() {
    for (name, store) in stores().await {
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();
        let first = store.create_job(user, session, "first").await.unwrap();
        let second = store.create_job(user, session, "second").await.unwrap();
        assert_eq!(first.status, JobStatus::Pending, "{name}");

        let pending = store.list_pending_jobs(10).await.unwrap();
        let ids: Vec<_> = pending.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![first.id, second.id], "{name}");

        assert_eq!(store.list_pending_jobs(1).await.unwrap().len(), 1, "{name}");
    }
}

// ---------------------------------------------------------------------------
// 2. Concurrent claims: exactly one wins
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_claims_have_one_winner() {
    for (name, store) in stores().await {
        let job = store
            .create_job(Uuid::new_v4(), Uuid::new_v4(), "race")
            .await
            .unwrap();

        let job_id = job.id;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.claim_job(job_id).await }));
        }
        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                Claim::Acquired(job) => {
                    assert_eq!(job.status, JobStatus::Processing);
                    winners += 1;
                }
                Claim::NotClaimable(status) => assert_eq!(status, JobStatus::Processing),
            }
        }
        assert_eq!(winners, 1, "{name}");
        assert!(store.list_pending_jobs(10).await.unwrap().is_empty(), "{name}");
    }
}

// ---------------------------------------------------------------------------
// 3. Completion writes exactly one report; failure writes none
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completion_and_failure_report_invariants() {
    for (name, store) in stores().await {
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();

        let ok = store.create_job(user, session, "report").await.unwrap();
        store.claim_job(ok.id).await.unwrap();
        let report = store
            .complete_job(
                ok.id,
                Some("# Strategic report"),
                &["# Strategic report".to_string()],
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.job_id, ok.id);
        assert_eq!(report.user_id, user);

        // A second completion is an illegal transition and adds nothing.
        let err = store
            .complete_job(ok.id, Some("again"), &["again".to_string()])
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                KogniaError::InvalidTransition {
                    from: JobStatus::Completed,
                    to: JobStatus::Completed
                }
            ),
            "{name}: {err}"
        );
        let stored = store.get_report_for_job(ok.id).await.unwrap().unwrap();
        assert_eq!(stored.content, "# Strategic report", "{name}");
        let messages = store.get_recent_context(session, 10).await.unwrap();
        assert_eq!(messages.len(), 1, "{name}");
        assert_eq!(messages[0].role, Role::Agent);
        assert_eq!(messages[0].content, "# Strategic report");

        let bad = store.create_job(user, session, "fails").await.unwrap();
        store.claim_job(bad.id).await.unwrap();
        store
            .fail_job(bad.id, &FailureReason::unroutable("no rule"))
            .await
            .unwrap();
        assert!(store.get_report_for_job(bad.id).await.unwrap().is_none());

        let view = store.job_view(bad.id).await.unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.failure.as_deref(), Some("unroutable_prompt"), "{name}");
        assert!(view.report.is_none());

        let view = store.job_view(ok.id).await.unwrap();
        assert_eq!(view.report.as_deref(), Some("# Strategic report"), "{name}");
        assert!(view.failure.is_none());
    }
}

// ---------------------------------------------------------------------------
// 4. Terminal jobs reject every transition and stay untouched
// ---------------------------------------------------------------------------

#[tokio::test]
async fn terminal_jobs_are_frozen() {
    for (name, store) in stores().await {
        let job = store
            .create_job(Uuid::new_v4(), Uuid::new_v4(), "frozen")
            .await
            .unwrap();
        store.claim_job(job.id).await.unwrap();
        store
            .fail_job(job.id, &FailureReason::cancelled())
            .await
            .unwrap();
        let before = store.get_job(job.id).await.unwrap().unwrap();

        assert!(store.complete_job(job.id, None, &[]).await.is_err(), "{name}");
        assert!(store
            .fail_job(job.id, &FailureReason::internal("again"))
            .await
            .is_err());
        assert_eq!(
            store.claim_job(job.id).await.unwrap(),
            Claim::NotClaimable(JobStatus::Failed)
        );
        assert_eq!(store.get_job(job.id).await.unwrap().unwrap(), before, "{name}");
    }
}

// ---------------------------------------------------------------------------
// 5. Completion without a report (simulation plans)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completion_without_report() {
    for (name, store) in stores().await {
        let job = store
            .create_job(Uuid::new_v4(), Uuid::new_v4(), "simulate")
            .await
            .unwrap();
        store.claim_job(job.id).await.unwrap();
        let turns = vec![
            "Ana: The app feels dated.".to_string(),
            "Marco: The loyalty program is strong.".to_string(),
        ];
        assert!(store
            .complete_job(job.id, None, &turns)
            .await
            .unwrap()
            .is_none());
        let view = store.job_view(job.id).await.unwrap();
        assert_eq!(view.status, JobStatus::Completed, "{name}");
        assert!(view.report.is_none());

        let messages = store.get_recent_context(job.session_id, 10).await.unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.clone()).collect();
        assert_eq!(contents, turns, "{name}");
        assert!(messages[0].created_at < messages[1].created_at);
    }
}

// ---------------------------------------------------------------------------
// 6. Message ordering follows created_at, even under concurrent appends
// ---------------------------------------------------------------------------

#[tokio::test]
async fn messages_are_strictly_ordered() {
    for (name, store) in stores().await {
        let session = Uuid::new_v4();
        let user = Uuid::new_v4();

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_message(session, user, Role::Agent, &format!("turn {i}"))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let all = store.get_recent_context(session, 100).await.unwrap();
        assert_eq!(all.len(), 20, "{name}");
        for pair in all.windows(2) {
            assert!(pair[0].created_at < pair[1].created_at, "{name}");
        }

        let recent = store.get_recent_context(session, 5).await.unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent.last().unwrap().id, all.last().unwrap().id, "{name}");
        assert_eq!(recent[0].id, all[15].id, "{name}");

        assert!(store
            .get_recent_context(Uuid::new_v4(), 5)
            .await
            .unwrap()
            .is_empty());
    }
}

// ---------------------------------------------------------------------------
// 7. Sessions: upsert refreshes the title, foreign owners are rejected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_upsert_and_ownership() {
    for (name, store) in stores().await {
        let session = Uuid::new_v4();
        let owner = Uuid::new_v4();

        let created = store
            .ensure_session(session, owner, "Analyze Brand X")
            .await
            .unwrap();
        assert_eq!(created.title, "Analyze Brand X");

        let refreshed = store
            .ensure_session(session, owner, "Summarize the last report")
            .await
            .unwrap();
        assert_eq!(refreshed.title, "Summarize the last report", "{name}");
        assert_eq!(refreshed.created_at, created.created_at);
        assert!(refreshed.updated_at >= created.updated_at);

        let err = store
            .ensure_session(session, Uuid::new_v4(), "hijack")
            .await
            .unwrap_err();
        assert!(matches!(err, KogniaError::Store(_)), "{name}");

        let loaded = store.get_session(session).await.unwrap().unwrap();
        assert_eq!(loaded.user_id, owner);
        assert!(store.get_session(Uuid::new_v4()).await.unwrap().is_none());
    }
}

// ---------------------------------------------------------------------------
// 8. Latest report per session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn latest_report_for_session() {
    for (name, store) in stores().await {
        let user = Uuid::new_v4();
        let session = Uuid::new_v4();
        let other_session = Uuid::new_v4();
        assert!(store
            .latest_report_for_session(session)
            .await
            .unwrap()
            .is_none());

        for (sid, content) in [
            (session, "old report"),
            (session, "new report"),
            (other_session, "unrelated"),
        ] {
            let job = store.create_job(user, sid, "p").await.unwrap();
            store.claim_job(job.id).await.unwrap();
            store.complete_job(job.id, Some(content), &[]).await.unwrap();
        }

        let latest = store
            .latest_report_for_session(session)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.content, "new report", "{name}");
    }
}

// ---------------------------------------------------------------------------
// 9. Cancellation flags
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancellation_flags() {
    for (name, store) in stores().await {
        let job = store
            .create_job(Uuid::new_v4(), Uuid::new_v4(), "long")
            .await
            .unwrap();
        assert!(!store.is_cancellation_requested(job.id).await.unwrap());
        assert!(store.request_cancellation(job.id).await.unwrap(), "{name}");
        assert!(store.is_cancellation_requested(job.id).await.unwrap());

        let done = store
            .create_job(Uuid::new_v4(), Uuid::new_v4(), "done")
            .await
            .unwrap();
        store.claim_job(done.id).await.unwrap();
        store.complete_job(done.id, None, &[]).await.unwrap();
        assert!(!store.request_cancellation(done.id).await.unwrap(), "{name}");

        assert!(matches!(
            store.request_cancellation(Uuid::new_v4()).await,
            Err(KogniaError::JobNotFound(_))
        ));
    }
}
