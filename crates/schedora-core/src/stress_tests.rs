//! Concurrency stress tests for the claim-exclusivity law: if M workers
//! race `claim_batch` against K ready jobs, exactly `min(M, K)` claims
//! succeed and every successful claim's job id is distinct.
//!
//! A sibling to the teacher's own `stress_tests` module in `seesaw-core`.

use crate::job::{Job, JobStatus, NewJob, RetryPolicy};
use crate::store::JobStore;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A deliberately coarse-grained store: one lock around a hash map,
/// exercising the same "no two callers observe the same PENDING row"
/// guarantee a real `FOR UPDATE SKIP LOCKED` scan provides, just with a
/// mutex instead of row locks.
struct LockStepStore {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl LockStepStore {
    fn new(ready_count: usize) -> Self {
        let mut jobs = HashMap::new();
        for _ in 0..ready_count {
            let id = Uuid::new_v4();
            let now = Utc::now();
            jobs.insert(
                id,
                Job {
                    job_id: id,
                    idempotency_key: id.to_string(),
                    job_type: "noop".to_string(),
                    payload: serde_json::json!({}),
                    priority: 5,
                    scheduled_at: now,
                    max_retries: 3,
                    retry_count: 0,
                    retry_policy: RetryPolicy::Exponential,
                    timeout_seconds: None,
                    status: JobStatus::Pending,
                    worker_id: None,
                    started_at: None,
                    completed_at: None,
                    error_message: None,
                    error_details: None,
                    result: None,
                    dependencies: vec![],
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        Self { jobs: Mutex::new(jobs) }
    }
}

#[async_trait]
impl JobStore for LockStepStore {
    async fn insert_job(&self, _new_job: NewJob) -> crate::error::Result<Job> {
        unimplemented!()
    }
    async fn get_job(&self, job_id: Uuid) -> crate::error::Result<Job> {
        Ok(self.jobs.lock().await.get(&job_id).cloned().unwrap())
    }
    async fn cancel_job(&self, _job_id: Uuid) -> crate::error::Result<Job> {
        unimplemented!()
    }
    async fn claim_batch(&self, worker_id: &str, limit: i64) -> crate::error::Result<Vec<Job>> {
        let mut jobs = self.jobs.lock().await;
        let mut claimed = Vec::new();
        for job in jobs.values_mut() {
            if claimed.len() as i64 >= limit {
                break;
            }
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Scheduled;
                job.worker_id = Some(worker_id.to_string());
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }
    async fn claim_optimistic(&self, _job_id: Uuid, _worker_id: &str) -> crate::error::Result<Option<Job>> {
        unimplemented!()
    }
    async fn mark_running(&self, _job_id: Uuid) -> crate::error::Result<Job> {
        unimplemented!()
    }
    async fn mark_success(&self, _job_id: Uuid, _result: serde_json::Value) -> crate::error::Result<Job> {
        unimplemented!()
    }
    async fn mark_failed(
        &self,
        _job_id: Uuid,
        _error_message: &str,
        _error_details: serde_json::Value,
    ) -> crate::error::Result<Job> {
        unimplemented!()
    }
    async fn mark_retrying_scheduled(
        &self,
        _job_id: Uuid,
        _next_scheduled_at: chrono::DateTime<Utc>,
    ) -> crate::error::Result<Job> {
        unimplemented!()
    }
    async fn mark_dead(&self, _job_id: Uuid) -> crate::error::Result<Job> {
        unimplemented!()
    }
    async fn reclaim_to_pending(&self, _job_id: Uuid) -> crate::error::Result<Option<Job>> {
        unimplemented!()
    }
    async fn ready_jobs(&self, _limit: i64) -> crate::error::Result<Vec<Job>> {
        unimplemented!()
    }
    async fn blocked_jobs(&self) -> crate::error::Result<Vec<Job>> {
        unimplemented!()
    }
}

#[tokio::test]
async fn claim_exclusivity_under_concurrent_callers() {
    const READY: usize = 7;
    const WORKERS: usize = 20;

    let store = Arc::new(LockStepStore::new(READY));

    let mut handles = Vec::new();
    for i in 0..WORKERS {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.claim_batch(&format!("worker-{i}"), 1).await.unwrap()
        }));
    }

    let mut claimed_ids = Vec::new();
    for h in handles {
        let jobs = h.await.unwrap();
        claimed_ids.extend(jobs.into_iter().map(|j| j.job_id));
    }

    assert_eq!(claimed_ids.len(), READY.min(WORKERS));

    let unique: std::collections::HashSet<_> = claimed_ids.iter().collect();
    assert_eq!(unique.len(), claimed_ids.len(), "every claimed job id must be distinct");
}
