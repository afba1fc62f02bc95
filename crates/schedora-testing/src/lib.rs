//! In-memory store implementations and fixture builders for testing the
//! Schedora engine without a live Postgres or Redis instance.
//!
//! `InMemoryJobStore`/`InMemoryWorkerStore`/`InMemoryWorkflowStore`
//! implement the same traits `schedora-postgres` does; `InMemoryPriorityQueue`,
//! `InMemoryHeartbeatMarker` and `InMemoryAssignmentTracker` stand in for
//! `schedora-queue`. Everything here is process-local and single-binary
//! only — no isolation or durability guarantees are attempted.

mod fixtures;
mod job_store;
mod side_store;
mod worker_store;
mod workflow_store;

pub use fixtures::{JobFactory, WorkerFactory, WorkflowFactory};
pub use job_store::InMemoryJobStore;
pub use side_store::{InMemoryAssignmentTracker, InMemoryHeartbeatMarker, InMemoryPriorityQueue};
pub use worker_store::InMemoryWorkerStore;
pub use workflow_store::InMemoryWorkflowStore;
