//! The job domain type and the data clients submit to create one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// `status` is persisted as a string, not an integer, so it survives
/// schema drift untouched on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Scheduled,
    Running,
    Retrying,
    Success,
    Failed,
    Dead,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Scheduled => "SCHEDULED",
            JobStatus::Running => "RUNNING",
            JobStatus::Retrying => "RETRYING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
            JobStatus::Dead => "DEAD",
            JobStatus::Canceled => "CANCELED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "PENDING" => JobStatus::Pending,
            "SCHEDULED" => JobStatus::Scheduled,
            "RUNNING" => JobStatus::Running,
            "RETRYING" => JobStatus::Retrying,
            "SUCCESS" => JobStatus::Success,
            "FAILED" => JobStatus::Failed,
            "DEAD" => JobStatus::Dead,
            "CANCELED" => JobStatus::Canceled,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryPolicy {
    Fixed,
    Exponential,
    Jitter,
}

impl RetryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryPolicy::Fixed => "FIXED",
            RetryPolicy::Exponential => "EXPONENTIAL",
            RetryPolicy::Jitter => "JITTER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "FIXED" => RetryPolicy::Fixed,
            "EXPONENTIAL" => RetryPolicy::Exponential,
            "JITTER" => RetryPolicy::Jitter,
            _ => return None,
        })
    }
}

/// Structured error captured on a failed execution: at minimum a `kind`
/// tag (`"timeout"`, `"handler_missing"`, `"handler_failure"`) and a
/// free-form location/stack payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub kind: String,
    #[serde(flatten)]
    pub extra: Value,
}

impl ErrorDetails {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            extra: Value::Null,
        }
    }

    pub fn with_extra(kind: impl Into<String>, extra: Value) -> Self {
        Self {
            kind: kind.into(),
            extra,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub idempotency_key: String,

    pub job_type: String,
    pub payload: Value,

    pub priority: i16,
    pub scheduled_at: DateTime<Utc>,

    pub max_retries: i32,
    pub retry_count: i32,
    pub retry_policy: RetryPolicy,
    pub timeout_seconds: Option<i64>,

    pub status: JobStatus,

    pub worker_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub error_details: Option<ErrorDetails>,
    pub result: Option<Value>,

    /// Predecessor job ids. The inverse (`dependents`) is a derived view,
    /// never materialised on the struct — see `dependency.rs`.
    pub dependencies: Vec<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        crate::state_machine::is_terminal(self.status)
    }
}

/// What a client submits to create a job. Mirrors the Submission API in
/// the external interfaces section.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub job_type: String,
    pub payload: Value,
    #[serde(default = "default_priority")]
    pub priority: i16,
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
    #[serde(default = "default_retry_policy")]
    pub retry_policy: RetryPolicy,
    pub timeout_seconds: Option<i64>,
    pub idempotency_key: String,
    /// When set, a dependency edge from `parent_job_id` to the new job is
    /// inserted atomically with the job itself.
    pub parent_job_id: Option<Uuid>,
}

fn default_priority() -> i16 {
    5
}

fn default_max_retries() -> i32 {
    3
}

fn default_retry_policy() -> RetryPolicy {
    RetryPolicy::Exponential
}

impl NewJob {
    /// Validates the fields the durable store's check constraints enforce,
    /// so callers fail fast before a round-trip.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(0..=10).contains(&self.priority) {
            return Err(format!("priority {} out of range [0,10]", self.priority));
        }
        if self.max_retries < 0 {
            return Err("max_retries must be >= 0".to_string());
        }
        if let Some(t) = self.timeout_seconds {
            if t <= 0 {
                return Err("timeout_seconds must be positive".to_string());
            }
        }
        if self.idempotency_key.trim().is_empty() {
            return Err("idempotency_key must not be empty".to_string());
        }
        Ok(())
    }
}
