//! Retry orchestration, kept outside the executor per the design notes:
//! the executor (C8) only ever knows about one invocation. This layer
//! observes a `FAILED` job and decides between `RETRYING -> SCHEDULED`
//! and `DEAD`, optionally moving the job to the DLQ when it dies.

use crate::error::Result;
use crate::job::Job;
use crate::queue::PriorityQueue;
use crate::retry::{compute_delay, next_time, should_retry};
use crate::store::JobStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

pub struct RetryLayer<S> {
    store: Arc<S>,
    queue: Option<Arc<dyn PriorityQueue>>,
    base_delay: Duration,
    max_delay: Duration,
}

impl<S: JobStore> RetryLayer<S> {
    pub fn new(store: Arc<S>, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            store,
            queue: None,
            base_delay,
            max_delay,
        }
    }

    /// Attaches the priority queue so a job that exhausts its retries is
    /// also moved to the DLQ. The durable `DEAD` transition and the DLQ
    /// write are not a single transaction — the store is the source of
    /// truth and the queue is a lossy fast path (§5) — but they are
    /// issued back-to-back so the two rarely drift, and a missing DLQ
    /// entry never leaves a job un-DEAD.
    pub fn with_queue(mut self, queue: Arc<dyn PriorityQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// `job` must already be in `FAILED` status (the executor's job).
    /// Returns the job's new state after retry or death.
    #[tracing::instrument(skip(self, job), fields(job_id = %job.job_id, retry_count = job.retry_count))]
    pub async fn handle_failure(&self, job: &Job) -> Result<Job> {
        if should_retry(job.retry_count, job.max_retries) {
            let delay = compute_delay(job.retry_count, job.retry_policy, self.base_delay, self.max_delay);
            let next = next_time(Utc::now(), delay);
            tracing::info!(job_id = %job.job_id, delay_secs = delay.as_secs(), "scheduling retry");
            self.store.mark_retrying_scheduled(job.job_id, next).await
        } else {
            tracing::warn!(job_id = %job.job_id, "retries exhausted, moving to dead letter");
            let dead = self.store.mark_dead(job.job_id).await?;
            if let Some(queue) = &self.queue {
                let reason = job
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "retries exhausted".to_string());
                if let Err(e) = queue.move_to_dlq(job.job_id, &reason, job.retry_count).await {
                    tracing::warn!(job_id = %job.job_id, error = %e, "failed to record dead-letter entry");
                }
            }
            Ok(dead)
        }
    }
}
