//! In-memory `JobStore`, backed by a `DashMap`. The one other crates and
//! integration tests should reach for — `schedora-core`'s own unit tests
//! keep a private, minimal double local to `executor.rs` instead of
//! depending back on this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use schedora_core::dependency;
use schedora_core::error::{Result, SchedoraError};
use schedora_core::job::{ErrorDetails, Job, JobStatus, NewJob};
use schedora_core::state_machine;
use schedora_core::store::JobStore;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

/// Keyed by job id, with a side index from idempotency key so duplicate
/// inserts fail the same way the Postgres unique constraint would.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<Uuid, Job>,
    by_idempotency_key: DashMap<String, Uuid>,
    clock: AtomicI64,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A monotonically increasing fake "now", so ordering assertions in
    /// tests don't depend on wall-clock resolution.
    fn tick(&self) -> DateTime<Utc> {
        let n = self.clock.fetch_add(1, Ordering::SeqCst);
        Utc::now() + chrono::Duration::nanoseconds(n)
    }

    fn predecessor_statuses(&self, job: &Job) -> Vec<JobStatus> {
        job.dependencies
            .iter()
            .filter_map(|id| self.jobs.get(id).map(|j| j.status))
            .collect()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_job(&self, new_job: NewJob) -> Result<Job> {
        if let Some(existing) = self.by_idempotency_key.get(&new_job.idempotency_key) {
            return Err(SchedoraError::DuplicateIdempotencyKey {
                key: new_job.idempotency_key,
                existing_job_id: *existing,
            });
        }
        let now = self.tick();
        let job_id = Uuid::new_v4();
        let dependencies = new_job.parent_job_id.into_iter().collect::<Vec<_>>();
        let job = Job {
            job_id,
            idempotency_key: new_job.idempotency_key.clone(),
            job_type: new_job.job_type,
            payload: new_job.payload,
            priority: new_job.priority,
            scheduled_at: new_job.scheduled_at.unwrap_or(now),
            max_retries: new_job.max_retries,
            retry_count: 0,
            retry_policy: new_job.retry_policy,
            timeout_seconds: new_job.timeout_seconds,
            status: JobStatus::Pending,
            worker_id: None,
            started_at: None,
            completed_at: None,
            error_message: None,
            error_details: None,
            result: None,
            dependencies,
            created_at: now,
            updated_at: now,
        };
        self.by_idempotency_key.insert(new_job.idempotency_key, job_id);
        self.jobs.insert(job_id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Job> {
        self.jobs.get(&job_id).map(|j| j.clone()).ok_or(SchedoraError::JobNotFound(job_id))
    }

    async fn cancel_job(&self, job_id: Uuid) -> Result<Job> {
        let mut entry = self.jobs.get_mut(&job_id).ok_or(SchedoraError::JobNotFound(job_id))?;
        state_machine::validate_transition(entry.status, JobStatus::Canceled)?;
        entry.status = JobStatus::Canceled;
        entry.updated_at = self.tick();
        Ok(entry.clone())
    }

    async fn claim_batch(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
        let now = Utc::now();
        let mut candidates: Vec<Uuid> = self
            .jobs
            .iter()
            .filter(|e| e.status == JobStatus::Pending && e.scheduled_at <= now)
            .filter(|e| dependency::dependencies_met(&self.predecessor_statuses(&e)))
            .map(|e| e.job_id)
            .collect();
        candidates.sort();
        candidates.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(candidates.len());
        for job_id in candidates {
            if let Some(mut entry) = self.jobs.get_mut(&job_id) {
                if entry.status == JobStatus::Pending {
                    entry.status = JobStatus::Scheduled;
                    entry.worker_id = Some(worker_id.to_string());
                    entry.updated_at = self.tick();
                    claimed.push(entry.clone());
                }
            }
        }
        Ok(claimed)
    }

    async fn claim_optimistic(&self, job_id: Uuid, worker_id: &str) -> Result<Option<Job>> {
        let Some(mut entry) = self.jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        if entry.status != JobStatus::Pending {
            return Ok(None);
        }
        entry.status = JobStatus::Scheduled;
        entry.worker_id = Some(worker_id.to_string());
        entry.updated_at = self.tick();
        Ok(Some(entry.clone()))
    }

    async fn mark_running(&self, job_id: Uuid) -> Result<Job> {
        let mut entry = self.jobs.get_mut(&job_id).ok_or(SchedoraError::JobNotFound(job_id))?;
        state_machine::validate_transition(entry.status, JobStatus::Running)?;
        let now = self.tick();
        entry.status = JobStatus::Running;
        entry.started_at = Some(now);
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn mark_success(&self, job_id: Uuid, result: Value) -> Result<Job> {
        let mut entry = self.jobs.get_mut(&job_id).ok_or(SchedoraError::JobNotFound(job_id))?;
        state_machine::validate_transition(entry.status, JobStatus::Success)?;
        let now = self.tick();
        entry.status = JobStatus::Success;
        entry.result = Some(result);
        entry.completed_at = Some(now);
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn mark_failed(&self, job_id: Uuid, error_message: &str, error_details: Value) -> Result<Job> {
        let mut entry = self.jobs.get_mut(&job_id).ok_or(SchedoraError::JobNotFound(job_id))?;
        state_machine::validate_transition(entry.status, JobStatus::Failed)?;
        let now = self.tick();
        entry.status = JobStatus::Failed;
        entry.error_message = Some(error_message.to_string());
        entry.error_details = serde_json::from_value::<ErrorDetails>(error_details.clone())
            .ok()
            .or_else(|| Some(ErrorDetails::with_extra("unknown", error_details)));
        entry.completed_at = Some(now);
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn mark_retrying_scheduled(&self, job_id: Uuid, next_scheduled_at: DateTime<Utc>) -> Result<Job> {
        let mut entry = self.jobs.get_mut(&job_id).ok_or(SchedoraError::JobNotFound(job_id))?;
        state_machine::validate_transition(entry.status, JobStatus::Retrying)?;
        state_machine::validate_transition(JobStatus::Retrying, JobStatus::Scheduled)?;
        entry.status = JobStatus::Scheduled;
        entry.retry_count += 1;
        entry.scheduled_at = next_scheduled_at;
        entry.worker_id = None;
        entry.updated_at = self.tick();
        Ok(entry.clone())
    }

    async fn mark_dead(&self, job_id: Uuid) -> Result<Job> {
        let mut entry = self.jobs.get_mut(&job_id).ok_or(SchedoraError::JobNotFound(job_id))?;
        state_machine::validate_transition(entry.status, JobStatus::Dead)?;
        entry.status = JobStatus::Dead;
        entry.updated_at = self.tick();
        Ok(entry.clone())
    }

    async fn reclaim_to_pending(&self, job_id: Uuid) -> Result<Option<Job>> {
        let Some(mut entry) = self.jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        if entry.status != JobStatus::Running {
            return Ok(None);
        }
        entry.status = JobStatus::Pending;
        entry.worker_id = None;
        entry.started_at = None;
        entry.updated_at = self.tick();
        Ok(Some(entry.clone()))
    }

    async fn ready_jobs(&self, limit: i64) -> Result<Vec<Job>> {
        let now = Utc::now();
        let mut ready: Vec<Job> = self
            .jobs
            .iter()
            .filter(|e| e.status == JobStatus::Pending && e.scheduled_at <= now)
            .filter(|e| dependency::dependencies_met(&self.predecessor_statuses(&e)))
            .map(|e| e.clone())
            .collect();
        ready.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        ready.truncate(limit.max(0) as usize);
        Ok(ready)
    }

    async fn blocked_jobs(&self) -> Result<Vec<Job>> {
        Ok(self
            .jobs
            .iter()
            .filter(|e| e.status == JobStatus::Pending)
            .filter(|e| dependency::has_failed_dependencies(&self.predecessor_statuses(&e)))
            .map(|e| e.clone())
            .collect())
    }
}
