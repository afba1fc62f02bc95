//! In-memory `WorkerStore`, backed by a `DashMap`.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use schedora_core::error::{Result, SchedoraError};
use schedora_core::store::WorkerStore;
use schedora_core::worker::{NewWorker, ResourceSample, Worker, WorkerStatus};

#[derive(Default)]
pub struct InMemoryWorkerStore {
    workers: DashMap<String, Worker>,
}

impl InMemoryWorkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerStore for InMemoryWorkerStore {
    async fn register(&self, new_worker: NewWorker) -> Result<Worker> {
        let now = Utc::now();
        let worker = Worker {
            worker_id: new_worker.worker_id.clone(),
            hostname: new_worker.hostname,
            pid: new_worker.pid,
            version: new_worker.version,
            max_concurrent_jobs: new_worker.max_concurrent_jobs,
            current_job_count: 0,
            jobs_processed: 0,
            jobs_succeeded: 0,
            jobs_failed: 0,
            cpu_percent: None,
            memory_mb: None,
            capabilities: new_worker.capabilities,
            metadata: new_worker.metadata,
            status: WorkerStatus::Active,
            started_at: Some(now),
            stopped_at: None,
            last_heartbeat_at: None,
        };
        self.workers.insert(new_worker.worker_id, worker.clone());
        Ok(worker)
    }

    async fn get_worker(&self, worker_id: &str) -> Result<Worker> {
        self.workers
            .get(worker_id)
            .map(|w| w.clone())
            .ok_or_else(|| SchedoraError::WorkerNotFound(worker_id.to_string()))
    }

    async fn list_workers(&self, status: Option<WorkerStatus>) -> Result<Vec<Worker>> {
        Ok(self
            .workers
            .iter()
            .filter(|w| status.map_or(true, |s| w.status == s))
            .map(|w| w.clone())
            .collect())
    }

    async fn heartbeat(&self, worker_id: &str, sample: Option<ResourceSample>) -> Result<Worker> {
        let mut entry = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| SchedoraError::WorkerNotFound(worker_id.to_string()))?;
        entry.last_heartbeat_at = Some(Utc::now());
        if let Some(sample) = sample {
            if sample.cpu_percent.is_some() {
                entry.cpu_percent = sample.cpu_percent;
            }
            if sample.memory_mb.is_some() {
                entry.memory_mb = sample.memory_mb;
            }
        }
        Ok(entry.clone())
    }

    async fn mark_stale(&self, worker_id: &str) -> Result<Worker> {
        let mut entry = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| SchedoraError::WorkerNotFound(worker_id.to_string()))?;
        if entry.status == WorkerStatus::Active {
            entry.status = WorkerStatus::Stale;
        }
        Ok(entry.clone())
    }

    async fn deregister(&self, worker_id: &str) -> Result<Worker> {
        let mut entry = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| SchedoraError::WorkerNotFound(worker_id.to_string()))?;
        entry.status = WorkerStatus::Stopped;
        entry.stopped_at = Some(Utc::now());
        Ok(entry.clone())
    }

    async fn adjust_job_count(&self, worker_id: &str, delta: i32) -> Result<()> {
        if let Some(mut entry) = self.workers.get_mut(worker_id) {
            let max = entry.max_concurrent_jobs;
            entry.current_job_count = (entry.current_job_count + delta).clamp(0, max);
        }
        Ok(())
    }

    async fn record_completion(&self, worker_id: &str, succeeded: bool) -> Result<()> {
        if let Some(mut entry) = self.workers.get_mut(worker_id) {
            entry.jobs_processed += 1;
            if succeeded {
                entry.jobs_succeeded += 1;
            } else {
                entry.jobs_failed += 1;
            }
        }
        Ok(())
    }

    async fn delete_stopped_before(&self, cutoff: chrono::DateTime<Utc>) -> Result<u64> {
        let to_remove: Vec<String> = self
            .workers
            .iter()
            .filter(|w| w.status == WorkerStatus::Stopped && w.stopped_at.map_or(false, |t| t < cutoff))
            .map(|w| w.worker_id.clone())
            .collect();
        let n = to_remove.len() as u64;
        for worker_id in to_remove {
            self.workers.remove(&worker_id);
        }
        Ok(n)
    }
}
