//! Builders for `NewJob`/`NewWorker`/`NewWorkflow`, grounded on the
//! original Python test suite's `tests/factories/job_factory.py`: sane
//! defaults for every field, with `.with_*` overrides for the ones a
//! given test actually cares about.

use schedora_core::job::{NewJob, RetryPolicy};
use schedora_core::worker::NewWorker;
use schedora_core::workflow::NewWorkflow;
use serde_json::{json, Value};
use uuid::Uuid;

pub struct JobFactory {
    job_type: String,
    payload: Value,
    priority: i16,
    max_retries: i32,
    retry_policy: RetryPolicy,
    timeout_seconds: Option<i64>,
    idempotency_key: String,
    parent_job_id: Option<Uuid>,
}

impl Default for JobFactory {
    fn default() -> Self {
        Self {
            job_type: "noop".to_string(),
            payload: json!({}),
            priority: 5,
            max_retries: 3,
            retry_policy: RetryPolicy::Exponential,
            timeout_seconds: None,
            idempotency_key: Uuid::new_v4().to_string(),
            parent_job_id: None,
        }
    }
}

impl JobFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_type(mut self, job_type: impl Into<String>) -> Self {
        self.job_type = job_type.into();
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn priority(mut self, priority: i16) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn timeout_seconds(mut self, timeout_seconds: i64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = key.into();
        self
    }

    pub fn depends_on(mut self, parent_job_id: Uuid) -> Self {
        self.parent_job_id = Some(parent_job_id);
        self
    }

    pub fn build(self) -> NewJob {
        NewJob {
            job_type: self.job_type,
            payload: self.payload,
            priority: self.priority,
            scheduled_at: None,
            max_retries: self.max_retries,
            retry_policy: self.retry_policy,
            timeout_seconds: self.timeout_seconds,
            idempotency_key: self.idempotency_key,
            parent_job_id: self.parent_job_id,
        }
    }
}

pub struct WorkerFactory {
    worker_id: String,
    hostname: String,
    pid: i32,
    version: String,
    max_concurrent_jobs: i32,
}

impl Default for WorkerFactory {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            hostname: "test-host".to_string(),
            pid: 1,
            version: "0.1.0".to_string(),
            max_concurrent_jobs: 4,
        }
    }
}

impl WorkerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn max_concurrent_jobs(mut self, n: i32) -> Self {
        self.max_concurrent_jobs = n;
        self
    }

    pub fn build(self) -> NewWorker {
        NewWorker {
            worker_id: self.worker_id,
            hostname: self.hostname,
            pid: self.pid,
            max_concurrent_jobs: self.max_concurrent_jobs,
            version: self.version,
            capabilities: None,
            metadata: None,
        }
    }
}

pub struct WorkflowFactory {
    name: String,
}

impl Default for WorkflowFactory {
    fn default() -> Self {
        Self {
            name: format!("workflow-{}", Uuid::new_v4()),
        }
    }
}

impl WorkflowFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn build(self) -> NewWorkflow {
        NewWorkflow {
            name: self.name,
            description: None,
            config: None,
        }
    }
}
