//! C3: the durable store contract.
//!
//! Grounded on the teacher's `JobStore` trait (`seesaw::job`) and its
//! Postgres implementation's explicit `mark_succeeded`/`mark_failed`
//! methods: rather than one generic "update status" call, each legal
//! transition gets its own named method so the SQL (and the invariants it
//! enforces) lives next to the edge it implements.
//!
//! Implementors (e.g. `schedora-postgres::PgJobStore`) are responsible for
//! the three obligations spec.md §4.3 names: unique insert, locked
//! ready-scan with the dependency predicate folded in, and check
//! constraints at write time.

use crate::error::Result;
use crate::job::{Job, NewJob};
use crate::worker::{NewWorker, ResourceSample, Worker, WorkerStatus};
use crate::workflow::{NewWorkflow, Workflow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fails with `DuplicateIdempotencyKey` if the key already exists.
    /// A concurrent check-then-insert race must still resolve to exactly
    /// one surviving row (a unique constraint on `idempotency_key`, not an
    /// application-level check, is what actually guarantees this).
    async fn insert_job(&self, new_job: NewJob) -> Result<Job>;

    async fn get_job(&self, job_id: Uuid) -> Result<Job>;

    /// Valid only from a non-terminal status; fails with
    /// `InvalidStateTransition` otherwise.
    async fn cancel_job(&self, job_id: Uuid) -> Result<Job>;

    /// C6's batch claim: a locked scan over `status = PENDING`,
    /// `scheduled_at <= now`, no unmet dependency, that skips rows another
    /// claimer already holds and transitions the rows it does see to
    /// `SCHEDULED` with `worker_id = worker_id`, all in one transaction.
    /// Ordering across the batch is unspecified (advisory priority only,
    /// honoured properly by the queue fast path).
    async fn claim_batch(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>>;

    /// The queue fast path (§4.6 point 4): when a worker already knows
    /// which job it wants (popped from the priority queue), it attempts
    /// the `PENDING -> SCHEDULED` transition guarded by an optimistic
    /// check that status is still `PENDING`. Returns `None` if another
    /// claimer won the race or the job's durable status had already moved
    /// on — the caller must discard the queue entry in that case, never
    /// retry the transition.
    async fn claim_optimistic(&self, job_id: Uuid, worker_id: &str) -> Result<Option<Job>>;

    /// `SCHEDULED|PENDING -> RUNNING`, `started_at = now`.
    async fn mark_running(&self, job_id: Uuid) -> Result<Job>;

    /// `RUNNING -> SUCCESS`, `completed_at = now`, writes `result`.
    async fn mark_success(&self, job_id: Uuid, result: Value) -> Result<Job>;

    /// `RUNNING -> FAILED`, `completed_at = now`, writes `error_message`
    /// and `error_details`. Does not decide whether to retry — that is
    /// the outer retry layer's job (see `retry_layer.rs`).
    async fn mark_failed(
        &self,
        job_id: Uuid,
        error_message: &str,
        error_details: Value,
    ) -> Result<Job>;

    /// `FAILED -> RETRYING -> SCHEDULED` as one atomic step: increments
    /// `retry_count` and sets `scheduled_at = next_scheduled_at`.
    async fn mark_retrying_scheduled(
        &self,
        job_id: Uuid,
        next_scheduled_at: DateTime<Utc>,
    ) -> Result<Job>;

    /// `FAILED -> DEAD`, retries exhausted.
    async fn mark_dead(&self, job_id: Uuid) -> Result<Job>;

    /// Stale-worker reclaim (§4.10): returns a `RUNNING` job to `PENDING`
    /// so any worker may claim it again. This is a crash-recovery
    /// override, not a normal state-machine edge — `RUNNING -> PENDING`
    /// does not appear in the §4.1 table, and implementations must not
    /// route it through `validate_transition`. Jobs already in a terminal
    /// state are left untouched (the caller is expected to check, but
    /// implementations should no-op rather than error if asked to reclaim
    /// a terminal job).
    async fn reclaim_to_pending(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// C4's bulk "ready" query: `PENDING` jobs whose dependencies (if any)
    /// are all `SUCCESS`.
    async fn ready_jobs(&self, limit: i64) -> Result<Vec<Job>>;

    /// C4's bulk "blocked" query: `PENDING` jobs with at least one
    /// predecessor in `{FAILED, DEAD, CANCELED}`.
    async fn blocked_jobs(&self) -> Result<Vec<Job>>;
}

#[async_trait]
pub trait WorkerStore: Send + Sync {
    async fn register(&self, new_worker: NewWorker) -> Result<Worker>;
    async fn get_worker(&self, worker_id: &str) -> Result<Worker>;
    async fn list_workers(&self, status: Option<WorkerStatus>) -> Result<Vec<Worker>>;

    /// Refreshes `last_heartbeat_at` and, if provided, the CPU/memory
    /// sample. Does not touch the fast-expiry marker — that lives in the
    /// side store (`schedora-queue`) and is the stale signal; this method
    /// is the durable half of the heartbeat.
    async fn heartbeat(&self, worker_id: &str, sample: Option<ResourceSample>) -> Result<Worker>;

    async fn mark_stale(&self, worker_id: &str) -> Result<Worker>;

    /// `status = STOPPED`, `stopped_at = now`. Callers must also clear the
    /// worker's assignment set in the side store.
    async fn deregister(&self, worker_id: &str) -> Result<Worker>;

    async fn adjust_job_count(&self, worker_id: &str, delta: i32) -> Result<()>;
    async fn record_completion(&self, worker_id: &str, succeeded: bool) -> Result<()>;

    /// Cleanup loop (C11): deletes workers `STOPPED` for longer than the
    /// caller's cutoff. Returns the number of rows removed.
    async fn delete_stopped_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Fails with `DuplicateWorkflowName` if `name` already exists.
    async fn create_workflow(&self, new_workflow: NewWorkflow) -> Result<Workflow>;
    async fn get_workflow(&self, workflow_id: Uuid) -> Result<Workflow>;
    async fn attach_job(&self, workflow_id: Uuid, job_id: Uuid) -> Result<()>;
    async fn jobs_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<Job>>;
}
