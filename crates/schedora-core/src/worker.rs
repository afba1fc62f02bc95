//! The worker domain type: an executor instance registered with the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Starting,
    Active,
    Stale,
    Stopping,
    Stopped,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Starting => "STARTING",
            WorkerStatus::Active => "ACTIVE",
            WorkerStatus::Stale => "STALE",
            WorkerStatus::Stopping => "STOPPING",
            WorkerStatus::Stopped => "STOPPED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "STARTING" => WorkerStatus::Starting,
            "ACTIVE" => WorkerStatus::Active,
            "STALE" => WorkerStatus::Stale,
            "STOPPING" => WorkerStatus::Stopping,
            "STOPPED" => WorkerStatus::Stopped,
            _ => return None,
        })
    }
}

/// A point-in-time CPU/memory sample taken at heartbeat time. Optional —
/// recovered from the original Python worker model, which persists these
/// alongside `last_heartbeat_at`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu_percent: Option<f64>,
    pub memory_mb: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub worker_id: String,
    pub hostname: String,
    pub pid: i32,
    pub version: String,

    pub max_concurrent_jobs: i32,
    pub current_job_count: i32,

    pub jobs_processed: i64,
    pub jobs_succeeded: i64,
    pub jobs_failed: i64,

    pub cpu_percent: Option<f64>,
    pub memory_mb: Option<f64>,

    pub capabilities: Option<Value>,
    pub metadata: Option<Value>,

    pub status: WorkerStatus,

    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

impl Worker {
    pub fn has_capacity(&self) -> bool {
        self.current_job_count < self.max_concurrent_jobs
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWorker {
    pub worker_id: String,
    pub hostname: String,
    pub pid: i32,
    pub max_concurrent_jobs: i32,
    pub version: String,
    pub capabilities: Option<Value>,
    pub metadata: Option<Value>,
}

impl NewWorker {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_concurrent_jobs <= 0 {
            return Err("max_concurrent_jobs must be > 0".to_string());
        }
        if self.worker_id.trim().is_empty() {
            return Err("worker_id must not be empty".to_string());
        }
        Ok(())
    }
}
