use crate::executor::{JobExecutor, JobOutcome};
use kognia_core::KogniaResult;
use kognia_store::JobStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Feeds pending jobs from the store into a [`JobExecutor`].
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    executor: JobExecutor,
    batch_size: usize,
}

impl Dispatcher {
    /// `batch_size` bounds how many pending jobs are listed per round.
    pub fn new(store: Arc<dyn JobStore>, executor: JobExecutor, batch_size: usize) -> Self {
        Self {
            store,
            executor,
            batch_size: batch_size.max(1),
        }
    }

    /// The executor jobs are submitted to.
    pub fn executor(&self) -> &JobExecutor {
        &self.executor
    }

    /// Submit one batch of pending jobs (oldest first) and wait for all of them.
    ///
    /// Jobs that fail with a store error are logged and left out of the result.
    pub async fn run_pending(&self) -> KogniaResult<Vec<JobOutcome>> {
        let pending = self.store.list_pending_jobs(self.batch_size).await?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        info!(count = pending.len(), "Dispatching pending jobs");

        let handles: Vec<_> = pending
            .iter()
            .map(|job| (job.id, self.executor.submit(job.id)))
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (job_id, handle) in handles {
            match handle.await {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => error!(job_id = %job_id, error = %e, "Job run failed"),
                Err(e) => error!(job_id = %job_id, error = %e, "Job task panicked"),
            }
        }
        Ok(outcomes)
    }

    /// Run batches until no pending job is left.
    pub async fn drain(&self) -> KogniaResult<Vec<JobOutcome>> {
        let mut all = Vec::new();
        loop {
            let pending = self.store.list_pending_jobs(1).await?;
            if pending.is_empty() {
                break;
            }
            let batch = self.run_pending().await?;
            if batch.is_empty() {
                warn!("No pending job could be processed, stopping drain");
                break;
            }
            all.extend(batch);
        }
        Ok(all)
    }

    /// Poll for pending jobs every `interval` until `shutdown` resolves.
    ///
    /// Returns how many jobs reached an outcome. In-flight batches finish
    /// before shutdown is observed.
    pub async fn watch<S>(&self, interval: Duration, shutdown: S) -> KogniaResult<usize>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut processed = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(processed, "Dispatcher shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    processed += self.drain().await?.len();
                }
            }
        }
        Ok(processed)
    }
}
