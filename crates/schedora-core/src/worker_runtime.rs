//! C9: the async worker. A cooperatively-scheduled polling loop with a
//! bounded in-flight count, claiming through either the scheduler's
//! direct scan or the priority queue fast path, and draining outstanding
//! executions on shutdown.

use crate::error::Result;
use crate::executor::JobExecutor;
use crate::heartbeat::{AssignmentTracker, HeartbeatMarker, HeartbeatService};
use crate::job::Job;
use crate::queue::PriorityQueue;
use crate::retry_layer::RetryLayer;
use crate::store::{JobStore, WorkerStore};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

pub struct WorkerConfig {
    pub worker_id: String,
    pub max_concurrent_jobs: usize,
    pub poll_interval: Duration,
    pub claim_batch_size: i64,
    pub shutdown_drain_timeout: Duration,
}

#[derive(Default)]
pub struct WorkerCounters {
    pub processed: AtomicI64,
    pub succeeded: AtomicI64,
    pub failed: AtomicI64,
}

pub struct AsyncWorker<S, W, M, A> {
    config: WorkerConfig,
    store: Arc<S>,
    executor: Arc<JobExecutor<S>>,
    retry_layer: Arc<RetryLayer<S>>,
    queue: Option<Arc<dyn PriorityQueue>>,
    heartbeat: Arc<HeartbeatService<W, M, A>>,
    counters: Arc<WorkerCounters>,
}

pub struct WorkerHandle {
    stop_tx: watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
    counters: Arc<WorkerCounters>,
    drain_timeout: Duration,
}

impl WorkerHandle {
    pub fn counters(&self) -> &WorkerCounters {
        &self.counters
    }

    /// Stops accepting new claims, then waits up to the configured drain
    /// timeout for outstanding executions. Anything still running past
    /// the deadline is left to the stale sweep to reclaim, per §5's
    /// cancellation policy.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if tokio::time::timeout(self.drain_timeout, self.join).await.is_err() {
            tracing::warn!("worker did not drain within shutdown timeout; remaining jobs left for stale reclaim");
        }
    }
}

impl<S, W, M, A> AsyncWorker<S, W, M, A>
where
    S: JobStore + 'static,
    W: WorkerStore + 'static,
    M: HeartbeatMarker + 'static,
    A: AssignmentTracker + 'static,
{
    pub fn new(
        config: WorkerConfig,
        store: Arc<S>,
        executor: Arc<JobExecutor<S>>,
        retry_layer: Arc<RetryLayer<S>>,
        heartbeat: Arc<HeartbeatService<W, M, A>>,
        queue: Option<Arc<dyn PriorityQueue>>,
    ) -> Self {
        Self {
            config,
            store,
            executor,
            retry_layer,
            queue,
            heartbeat,
            counters: Arc::new(WorkerCounters::default()),
        }
    }

    pub fn spawn(self) -> WorkerHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let drain_timeout = self.config.shutdown_drain_timeout;
        let counters = self.counters.clone();
        let join = tokio::spawn(self.run(stop_rx));
        WorkerHandle {
            stop_tx,
            join,
            counters,
            drain_timeout,
        }
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_jobs));
        let mut in_flight = tokio::task::JoinSet::new();

        loop {
            if *stop.borrow() {
                break;
            }

            match self.try_claim().await {
                Ok(Some(job)) => {
                    let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                    self.dispatch(&mut in_flight, permit, job).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = stop.changed() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!(worker_id = %self.config.worker_id, error = %e, "claim attempt failed");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }

            // Drain any finished execution tasks without blocking the poll
            // loop on them.
            while in_flight.try_join_next().is_some() {}
        }

        // Stop accepting new claims; drain whatever is still running. The
        // caller's `WorkerHandle::shutdown` bounds the total wait.
        while in_flight.join_next().await.is_some() {}
    }

    /// Tries the queue fast path first (if configured), falling back to
    /// the scheduler's direct scan. A job popped from the queue whose
    /// optimistic claim loses the race (or whose durable status had
    /// already moved on) is simply discarded — per §4.5/§8, the queue is
    /// not retried for that entry.
    async fn try_claim(&self) -> Result<Option<Job>> {
        if let Some(queue) = &self.queue {
            match queue.dequeue().await {
                Ok(Some(job_id)) => {
                    return match self.store.claim_optimistic(job_id, &self.config.worker_id).await {
                        Ok(Some(job)) => Ok(Some(job)),
                        Ok(None) => Ok(None), // lost the race or no longer claimable; queue entry is already gone
                        Err(e) => Err(e),
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "priority queue unavailable, falling back to direct scan");
                }
            }
        }

        let mut batch = self
            .store
            .claim_batch(&self.config.worker_id, self.config.claim_batch_size)
            .await?;
        Ok(if batch.is_empty() { None } else { Some(batch.remove(0)) })
    }

    async fn dispatch(
        &self,
        in_flight: &mut tokio::task::JoinSet<()>,
        permit: tokio::sync::OwnedSemaphorePermit,
        job: Job,
    ) {
        let job_id = job.job_id;
        let worker_id = self.config.worker_id.clone();
        let executor = self.executor.clone();
        let retry_layer = self.retry_layer.clone();
        let heartbeat = self.heartbeat.clone();
        let counters = self.counters.clone();

        if let Err(e) = heartbeat.assignments().assign(&worker_id, job_id).await {
            tracing::warn!(%job_id, error = %e, "failed to record job assignment");
        }
        if let Err(e) = heartbeat.worker_store().adjust_job_count(&worker_id, 1).await {
            tracing::warn!(%job_id, error = %e, "failed to bump worker job count");
        }

        in_flight.spawn(async move {
            let _permit = permit;
            counters.processed.fetch_add(1, Ordering::Relaxed);

            let outcome = executor.execute(job).await;
            let succeeded = match outcome {
                Ok(finished) if finished.status == crate::job::JobStatus::Success => {
                    counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    Some(true)
                }
                Ok(finished) if finished.status == crate::job::JobStatus::Failed => {
                    if let Err(e) = retry_layer.handle_failure(&finished).await {
                        tracing::warn!(%job_id, error = %e, "retry layer failed to process failure");
                    }
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    Some(false)
                }
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(%job_id, error = %e, "executor failed to run job");
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    Some(false)
                }
            };

            if let Some(succeeded) = succeeded {
                if let Err(e) = heartbeat.worker_store().record_completion(&worker_id, succeeded).await {
                    tracing::warn!(%job_id, error = %e, "failed to record job completion");
                }
            }
            if let Err(e) = heartbeat.worker_store().adjust_job_count(&worker_id, -1).await {
                tracing::warn!(%job_id, error = %e, "failed to decrement worker job count");
            }
            if let Err(e) = heartbeat.assignments().unassign(&worker_id, job_id).await {
                tracing::warn!(%job_id, error = %e, "failed to clear job assignment");
            }
        });
    }
}
