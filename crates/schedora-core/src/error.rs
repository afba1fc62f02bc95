//! Error taxonomy for the Schedora engine.
//!
//! One enum, `SchedoraError`, surfaces every kind spec'd in the error
//! handling design: duplicate keys, missing entities, invalid transitions,
//! and handler failures are all distinct variants rather than strings.

use crate::job::JobStatus;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SchedoraError {
    #[error("idempotency key {key:?} already exists on job {existing_job_id}")]
    DuplicateIdempotencyKey { key: String, existing_job_id: Uuid },

    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("worker {0:?} not found")]
    WorkerNotFound(String),

    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("invalid state transition {from:?} -> {to:?}")]
    InvalidStateTransition { from: JobStatus, to: JobStatus },

    #[error("workflow name {0:?} already exists")]
    DuplicateWorkflowName(String),

    #[error("no handler registered for job type {0:?}")]
    HandlerMissing(String),

    #[error("handler for job {job_id} timed out after {elapsed_secs}s")]
    HandlerTimeout { job_id: Uuid, elapsed_secs: u64 },

    #[error("handler for job {job_id} failed: {message}")]
    HandlerFailure {
        job_id: Uuid,
        message: String,
        details: Value,
    },

    #[error("side store unavailable: {0}")]
    SideStoreUnavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SchedoraError>;

/// Classifies an error as caller-facing (surfaced verbatim) vs.
/// internal (logged, swallowed by background loops). Mirrors the
/// propagation policy in the error handling design section.
pub trait Categorizable {
    fn is_client_error(&self) -> bool;
}

impl Categorizable for SchedoraError {
    fn is_client_error(&self) -> bool {
        matches!(
            self,
            SchedoraError::DuplicateIdempotencyKey { .. }
                | SchedoraError::JobNotFound(_)
                | SchedoraError::WorkerNotFound(_)
                | SchedoraError::WorkflowNotFound(_)
                | SchedoraError::InvalidStateTransition { .. }
                | SchedoraError::DuplicateWorkflowName(_)
        )
    }
}
