//! C8: the job executor. Drives one claimed job through
//! `RUNNING -> (SUCCESS|FAILED)`, with a per-job timeout.
//!
//! Handler failures are *captured*, never propagated: per the error
//! handling design, a handler error becomes a `FAILED` job with
//! structured `error_details`, and flows on to the retry layer
//! (`retry_layer.rs`) rather than bubbling up to the caller.

use crate::error::Result;
use crate::job::{ErrorDetails, Job, JobStatus};
use crate::registry::HandlerRegistry;
use crate::store::JobStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

enum Outcome {
    Success(serde_json::Value),
    Timeout { elapsed_secs: u64 },
    HandlerFailed(anyhow::Error),
}

pub struct JobExecutor<S> {
    store: Arc<S>,
    registry: Arc<HandlerRegistry>,
}

impl<S: JobStore> JobExecutor<S> {
    pub fn new(store: Arc<S>, registry: Arc<HandlerRegistry>) -> Self {
        Self { store, registry }
    }

    /// Runs `job` to completion, writing every observed outcome back to
    /// the store. Never returns an error for a handler failure — only
    /// for a store I/O failure, which the caller (the async worker) logs
    /// and moves past.
    #[tracing::instrument(skip(self, job), fields(job_id = %job.job_id, job_type = %job.job_type))]
    pub async fn execute(&self, job: Job) -> Result<Job> {
        let job = if job.status != JobStatus::Running {
            self.store.mark_running(job.job_id).await?
        } else {
            job
        };

        let handler = match self.registry.get(&job.job_type) {
            Ok(handler) => handler,
            Err(_) => {
                return self
                    .fail(
                        job.job_id,
                        format!("no handler registered for job type {:?}", job.job_type),
                        ErrorDetails::new("handler_missing"),
                    )
                    .await;
            }
        };

        let outcome = self.run_with_timeout(&job, handler.as_ref()).await;

        match outcome {
            Outcome::Success(result) => Ok(self.store.mark_success(job.job_id, result).await?),
            Outcome::Timeout { elapsed_secs } => {
                self.fail(
                    job.job_id,
                    format!("handler timed out after {elapsed_secs}s"),
                    ErrorDetails::new("timeout"),
                )
                .await
            }
            Outcome::HandlerFailed(e) => {
                self.fail(
                    job.job_id,
                    e.to_string(),
                    ErrorDetails::with_extra("handler_failure", json!({ "message": e.to_string() })),
                )
                .await
            }
        }
    }

    async fn run_with_timeout(
        &self,
        job: &Job,
        handler: &dyn crate::registry::Handler,
    ) -> Outcome {
        let fut = handler.invoke(job.payload.clone());
        match job.timeout_seconds {
            Some(secs) if secs > 0 => {
                match tokio::time::timeout(Duration::from_secs(secs as u64), fut).await {
                    Ok(Ok(value)) => Outcome::Success(value),
                    Ok(Err(e)) => Outcome::HandlerFailed(e),
                    Err(_) => Outcome::Timeout {
                        elapsed_secs: secs as u64,
                    },
                }
            }
            _ => match fut.await {
                Ok(value) => Outcome::Success(value),
                Err(e) => Outcome::HandlerFailed(e),
            },
        }
    }

    async fn fail(&self, job_id: Uuid, message: String, details: ErrorDetails) -> Result<Job> {
        let details = serde_json::to_value(details).unwrap_or(serde_json::Value::Null);
        tracing::warn!(job_id = %job_id, %message, "job failed");
        self.store.mark_failed(job_id, &message, details).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FnHandler;
    use schedora_testing_support::InMemoryJobStore;
    use serde_json::json;

    // A tiny in-crate store double, kept local to avoid a circular
    // dependency on the `schedora-testing` crate (which itself depends on
    // `schedora-core`). `schedora-testing`'s `InMemoryJobStore` is the one
    // other crates and integration tests should reach for.
    mod schedora_testing_support {
        use super::*;
        use crate::job::{NewJob, RetryPolicy};
        use crate::store::JobStore;
        use async_trait::async_trait;
        use chrono::Utc;
        use std::sync::Mutex;

        pub struct InMemoryJobStore {
            jobs: Mutex<std::collections::HashMap<Uuid, Job>>,
        }

        impl InMemoryJobStore {
            pub fn new() -> Self {
                Self {
                    jobs: Mutex::new(std::collections::HashMap::new()),
                }
            }

            pub fn seed(&self, job_type: &str, payload: serde_json::Value, timeout_seconds: Option<i64>) -> Uuid {
                let id = Uuid::new_v4();
                let now = Utc::now();
                self.jobs.lock().unwrap().insert(
                    id,
                    Job {
                        job_id: id,
                        idempotency_key: id.to_string(),
                        job_type: job_type.to_string(),
                        payload,
                        priority: 5,
                        scheduled_at: now,
                        max_retries: 3,
                        retry_count: 0,
                        retry_policy: RetryPolicy::Exponential,
                        timeout_seconds,
                        status: JobStatus::Scheduled,
                        worker_id: Some("w1".to_string()),
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
                id
            }

            pub fn get(&self, id: Uuid) -> Job {
                self.jobs.lock().unwrap().get(&id).cloned().unwrap()
            }
        }

        #[async_trait]
        impl JobStore for InMemoryJobStore {
            async fn insert_job(&self, _new_job: NewJob) -> Result<Job> {
                unimplemented!("not needed for executor tests")
            }
            async fn get_job(&self, job_id: Uuid) -> Result<Job> {
                Ok(self.get(job_id))
            }
            async fn cancel_job(&self, _job_id: Uuid) -> Result<Job> {
                unimplemented!()
            }
            async fn claim_batch(&self, _worker_id: &str, _limit: i64) -> Result<Vec<Job>> {
                unimplemented!()
            }
            async fn claim_optimistic(&self, _job_id: Uuid, _worker_id: &str) -> Result<Option<Job>> {
                unimplemented!()
            }
            async fn mark_running(&self, job_id: Uuid) -> Result<Job> {
                let mut jobs = self.jobs.lock().unwrap();
                let job = jobs.get_mut(&job_id).unwrap();
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
                Ok(job.clone())
            }
            async fn mark_success(&self, job_id: Uuid, result: serde_json::Value) -> Result<Job> {
                let mut jobs = self.jobs.lock().unwrap();
                let job = jobs.get_mut(&job_id).unwrap();
                job.status = JobStatus::Success;
                job.completed_at = Some(Utc::now());
                job.result = Some(result);
                Ok(job.clone())
            }
            async fn mark_failed(
                &self,
                job_id: Uuid,
                error_message: &str,
                error_details: serde_json::Value,
            ) -> Result<Job> {
                let mut jobs = self.jobs.lock().unwrap();
                let job = jobs.get_mut(&job_id).unwrap();
                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
                job.error_message = Some(error_message.to_string());
                job.error_details = serde_json::from_value(error_details).ok();
                Ok(job.clone())
            }
            async fn mark_retrying_scheduled(
                &self,
                _job_id: Uuid,
                _next_scheduled_at: chrono::DateTime<Utc>,
            ) -> Result<Job> {
                unimplemented!()
            }
            async fn mark_dead(&self, _job_id: Uuid) -> Result<Job> {
                unimplemented!()
            }
            async fn reclaim_to_pending(&self, _job_id: Uuid) -> Result<Option<Job>> {
                unimplemented!()
            }
            async fn ready_jobs(&self, _limit: i64) -> Result<Vec<Job>> {
                unimplemented!()
            }
            async fn blocked_jobs(&self) -> Result<Vec<Job>> {
                unimplemented!()
            }
        }
    }

    fn registry_with_echo() -> Arc<HandlerRegistry> {
        let registry = HandlerRegistry::new();
        registry
            .register("echo", Arc::new(FnHandler(|p: serde_json::Value| async move { Ok(p) })))
            .unwrap();
        Arc::new(registry)
    }

    #[tokio::test]
    async fn successful_handler_marks_success_with_result() {
        let store = Arc::new(InMemoryJobStore::new());
        let job_id = store.seed("echo", json!({"x": 1}), None);
        let job = store.get(job_id);

        let executor = JobExecutor::new(store.clone(), registry_with_echo());
        let finished = executor.execute(job).await.unwrap();

        assert_eq!(finished.status, JobStatus::Success);
        assert_eq!(finished.result, Some(json!({"x": 1})));
        assert!(finished.started_at.unwrap() <= finished.completed_at.unwrap());
    }

    #[tokio::test]
    async fn missing_handler_fails_with_handler_missing_kind() {
        let store = Arc::new(InMemoryJobStore::new());
        let job_id = store.seed("nonexistent", json!({}), None);
        let job = store.get(job_id);

        let executor = JobExecutor::new(store.clone(), registry_with_echo());
        let finished = executor.execute(job).await.unwrap();

        assert_eq!(finished.status, JobStatus::Failed);
        assert_eq!(finished.error_details.unwrap().kind, "handler_missing");
    }

    #[tokio::test]
    async fn slow_handler_times_out() {
        let store = Arc::new(InMemoryJobStore::new());
        let job_id = store.seed("sleep", json!({}), Some(1));
        let job = store.get(job_id);

        let registry = HandlerRegistry::new();
        registry
            .register(
                "sleep",
                Arc::new(FnHandler(|_: serde_json::Value| async move {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(json!({}))
                })),
            )
            .unwrap();

        let executor = JobExecutor::new(store.clone(), Arc::new(registry));
        let finished = executor.execute(job).await.unwrap();

        assert_eq!(finished.status, JobStatus::Failed);
        assert_eq!(finished.error_details.unwrap().kind, "timeout");
    }

    #[tokio::test]
    async fn handler_error_is_captured_not_propagated() {
        let store = Arc::new(InMemoryJobStore::new());
        let job_id = store.seed("boom", json!({}), None);
        let job = store.get(job_id);

        let registry = HandlerRegistry::new();
        registry
            .register(
                "boom",
                Arc::new(FnHandler(|_: serde_json::Value| async move {
                    anyhow::bail!("kaboom")
                })),
            )
            .unwrap();

        let executor = JobExecutor::new(store.clone(), Arc::new(registry));
        let finished = executor.execute(job).await.unwrap();

        assert_eq!(finished.status, JobStatus::Failed);
        assert_eq!(finished.error_details.unwrap().kind, "handler_failure");
        assert_eq!(finished.error_message.as_deref(), Some("kaboom"));
    }
}
