//! Workflow: a named grouping of jobs, aggregated for status reporting.
//! Not itself a unit of execution — see `aggregator.rs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub config: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWorkflow {
    pub name: String,
    pub description: Option<String>,
    pub config: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowOverallStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub running: u64,
    pub overall: WorkflowOverallStatus,
}
