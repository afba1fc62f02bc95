//! C10: the heartbeat service. Two parallel tracks per worker — a
//! fast-expiry marker in the side store (the stale signal) and a durable
//! timestamp in the job store — plus the per-worker assignment set used
//! for reclaim.

use crate::error::Result;
use crate::job::JobStatus;
use crate::store::{JobStore, WorkerStore};
use crate::worker::{NewWorker, ResourceSample, Worker};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// The fast-expiry marker: `worker:{id}:heartbeat` with TTL =
/// `heartbeat_timeout` in the side store. Its disappearance, not an
/// explicit status flag, is the stale signal.
#[async_trait]
pub trait HeartbeatMarker: Send + Sync {
    async fn install(&self, worker_id: &str, ttl: Duration) -> Result<()>;
    async fn refresh(&self, worker_id: &str, ttl: Duration) -> Result<()>;
    async fn is_alive(&self, worker_id: &str) -> Result<bool>;
    async fn remove(&self, worker_id: &str) -> Result<()>;
}

/// The per-worker set of currently-in-flight job ids, `worker:{id}:jobs`
/// in the side store.
#[async_trait]
pub trait AssignmentTracker: Send + Sync {
    async fn assign(&self, worker_id: &str, job_id: Uuid) -> Result<()>;
    async fn unassign(&self, worker_id: &str, job_id: Uuid) -> Result<()>;
    async fn assignments(&self, worker_id: &str) -> Result<Vec<Uuid>>;
    async fn clear(&self, worker_id: &str) -> Result<()>;
}

pub struct HeartbeatService<W, M, A> {
    worker_store: Arc<W>,
    marker: Arc<M>,
    assignments: Arc<A>,
    heartbeat_timeout: Duration,
}

impl<W, M, A> HeartbeatService<W, M, A>
where
    W: WorkerStore,
    M: HeartbeatMarker,
    A: AssignmentTracker,
{
    pub fn new(worker_store: Arc<W>, marker: Arc<M>, assignments: Arc<A>, heartbeat_timeout: Duration) -> Self {
        Self {
            worker_store,
            marker,
            assignments,
            heartbeat_timeout,
        }
    }

    pub fn worker_store(&self) -> &Arc<W> {
        &self.worker_store
    }

    pub fn assignments(&self) -> &Arc<A> {
        &self.assignments
    }

    /// Whether `worker_id`'s fast-expiry marker is still present. Used by
    /// the stale sweep; a side-store error propagates so the sweep can
    /// tell "confirmed dead" from "couldn't check" apart.
    pub async fn marker_is_alive(&self, worker_id: &str) -> Result<bool> {
        self.marker.is_alive(worker_id).await
    }

    /// Creates the durable row (`status = ACTIVE`) and installs the
    /// marker. If the side store is unavailable, the worker is still
    /// registered durably — the marker install failure is logged, and the
    /// worker simply starts out eligible for the stale sweep until the
    /// next successful heartbeat re-seeds the marker.
    #[tracing::instrument(skip(self, new_worker), fields(worker_id = %new_worker.worker_id))]
    pub async fn register(&self, new_worker: NewWorker) -> Result<Worker> {
        let worker = self.worker_store.register(new_worker).await?;
        if let Err(e) = self.marker.install(&worker.worker_id, self.heartbeat_timeout).await {
            tracing::warn!(worker_id = %worker.worker_id, error = %e, "failed to install heartbeat marker");
        }
        Ok(worker)
    }

    /// Refreshes both tracks: the marker (cheap, side store) and
    /// `last_heartbeat_at` plus any resource sample (durable).
    pub async fn heartbeat(&self, worker_id: &str, sample: Option<ResourceSample>) -> Result<Worker> {
        if let Err(e) = self.marker.refresh(worker_id, self.heartbeat_timeout).await {
            tracing::warn!(worker_id, error = %e, "failed to refresh heartbeat marker");
        }
        self.worker_store.heartbeat(worker_id, sample).await
    }

    /// Removes the marker, clears the assignment set, and marks the
    /// worker `STOPPED`.
    pub async fn deregister(&self, worker_id: &str) -> Result<Worker> {
        if let Err(e) = self.marker.remove(worker_id).await {
            tracing::warn!(worker_id, error = %e, "failed to remove heartbeat marker on deregister");
        }
        self.assignments.clear(worker_id).await?;
        self.worker_store.deregister(worker_id).await
    }

    /// Stale reclaim (§4.10): every job in `worker_id`'s assignment set
    /// that is still `RUNNING` is returned to `PENDING`; jobs already
    /// terminal are left alone. The assignment set is cleared
    /// unconditionally afterwards.
    #[tracing::instrument(skip(self, job_store), fields(worker_id))]
    pub async fn handle_stale_worker<J: JobStore>(&self, worker_id: &str, job_store: &J) -> Result<usize> {
        let job_ids = self.assignments.assignments(worker_id).await?;
        let mut reclaimed = 0;
        for job_id in job_ids {
            match job_store.get_job(job_id).await {
                Ok(job) if job.status == JobStatus::Running => match job_store.reclaim_to_pending(job_id).await {
                    Ok(Some(_)) => reclaimed += 1,
                    Ok(None) => {}
                    Err(e) => tracing::warn!(worker_id, %job_id, error = %e, "failed to reclaim job"),
                },
                Ok(_) => {} // already terminal or otherwise not running: leave it alone
                Err(e) => tracing::warn!(worker_id, %job_id, error = %e, "failed to load job during reclaim"),
            }
        }
        self.assignments.clear(worker_id).await?;
        Ok(reclaimed)
    }
}
