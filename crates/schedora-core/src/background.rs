//! C11: the two periodic background loops — stale-worker sweep and
//! stopped-worker cleanup — each a cooperative loop on its own interval,
//! sharing one stop signal.

use crate::heartbeat::{AssignmentTracker, HeartbeatMarker, HeartbeatService};
use crate::store::{JobStore, WorkerStore};
use crate::worker::WorkerStatus;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct BackgroundConfig {
    pub stale_check_interval: Duration,
    pub cleanup_interval: Duration,
    pub cleanup_after: Duration,
    pub shutdown_grace: Duration,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            stale_check_interval: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(300),
            cleanup_after: Duration::from_secs(3600),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

pub struct BackgroundLoops<W, M, A, J> {
    heartbeat: Arc<HeartbeatService<W, M, A>>,
    job_store: Arc<J>,
    config: BackgroundConfig,
}

pub struct BackgroundHandle {
    stop_tx: watch::Sender<bool>,
    stale_sweep: tokio::task::JoinHandle<()>,
    cleanup: tokio::task::JoinHandle<()>,
    grace: Duration,
}

impl BackgroundHandle {
    /// Signals both loops to stop, then waits up to the configured grace
    /// period for them to join; anything still running past the deadline
    /// is aborted.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        let joined = tokio::time::timeout(self.grace, async {
            let _ = self.stale_sweep.await;
            let _ = self.cleanup.await;
        })
        .await;
        if joined.is_err() {
            tracing::warn!("background loops did not stop within the grace period; aborting");
        }
    }
}

impl<W, M, A, J> BackgroundLoops<W, M, A, J>
where
    W: WorkerStore + 'static,
    M: HeartbeatMarker + 'static,
    A: AssignmentTracker + 'static,
    J: JobStore + 'static,
{
    pub fn new(heartbeat: Arc<HeartbeatService<W, M, A>>, job_store: Arc<J>, config: BackgroundConfig) -> Self {
        Self {
            heartbeat,
            job_store,
            config,
        }
    }

    pub fn spawn(self) -> BackgroundHandle {
        let (stop_tx, stop_rx1) = watch::channel(false);
        let stop_rx2 = stop_rx1.clone();
        let grace = self.config.shutdown_grace;

        let heartbeat = self.heartbeat;
        let job_store = self.job_store;
        let stale_check_interval = self.config.stale_check_interval;
        let cleanup_interval = self.config.cleanup_interval;
        let cleanup_after = self.config.cleanup_after;

        let stale_sweep = tokio::spawn(Self::run_stale_sweep(
            heartbeat.clone(),
            job_store.clone(),
            stale_check_interval,
            stop_rx1,
        ));
        let cleanup = tokio::spawn(Self::run_cleanup(heartbeat, cleanup_interval, cleanup_after, stop_rx2));

        BackgroundHandle {
            stop_tx,
            stale_sweep,
            cleanup,
            grace,
        }
    }

    async fn run_stale_sweep(
        heartbeat: Arc<HeartbeatService<W, M, A>>,
        job_store: Arc<J>,
        interval: Duration,
        mut stop: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    Self::sweep_once(&heartbeat, job_store.as_ref()).await;
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn sweep_once(heartbeat: &Arc<HeartbeatService<W, M, A>>, job_store: &J) {
        let active = match heartbeat.worker_store().list_workers(Some(WorkerStatus::Active)).await {
            Ok(workers) => workers,
            Err(e) => {
                tracing::warn!(error = %e, "stale sweep: failed to list active workers");
                return;
            }
        };

        for worker in active {
            let alive = heartbeat_marker_alive(heartbeat, &worker.worker_id).await;
            if alive {
                continue;
            }
            if let Err(e) = heartbeat.worker_store().mark_stale(&worker.worker_id).await {
                tracing::warn!(worker_id = %worker.worker_id, error = %e, "failed to mark worker stale");
                continue;
            }
            match heartbeat.handle_stale_worker(&worker.worker_id, job_store).await {
                Ok(reclaimed) => {
                    tracing::info!(worker_id = %worker.worker_id, reclaimed, "reclaimed jobs from stale worker");
                }
                Err(e) => {
                    tracing::warn!(worker_id = %worker.worker_id, error = %e, "failed to reclaim stale worker's jobs");
                }
            }
        }
    }

    async fn run_cleanup(
        heartbeat: Arc<HeartbeatService<W, M, A>>,
        interval: Duration,
        cleanup_after: Duration,
        mut stop: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cutoff = Utc::now() - chrono::Duration::from_std(cleanup_after).unwrap_or_default();
                    match heartbeat.worker_store().delete_stopped_before(cutoff).await {
                        Ok(n) if n > 0 => tracing::info!(deleted = n, "cleaned up long-stopped workers"),
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "cleanup loop failed"),
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

async fn heartbeat_marker_alive<W, M, A>(heartbeat: &Arc<HeartbeatService<W, M, A>>, worker_id: &str) -> bool
where
    W: WorkerStore,
    M: HeartbeatMarker,
    A: AssignmentTracker,
{
    // A side-store outage must not manufacture false stale workers: if we
    // can't reach the marker store, treat the worker as alive and let the
    // next successful sweep make the call.
    match heartbeat.marker_is_alive(worker_id).await {
        Ok(alive) => alive,
        Err(e) => {
            tracing::warn!(worker_id, error = %e, "side store unavailable during stale sweep");
            true
        }
    }
}
