//! # Schedora
//!
//! A durable, distributed job orchestration engine: clients submit jobs
//! with an idempotency key, optional schedule time, priority, retry
//! policy, and optional dependencies on other jobs. The engine persists
//! every job, transitions it through a well-defined state machine,
//! distributes work to a fleet of workers, guarantees at-most-one
//! execution of each claim, retries failures with backoff, and aggregates
//! jobs into workflows for status reporting.
//!
//! ## Architecture
//!
//! ```text
//! client ──insert──▶ JobStore (durable) ──optionally──▶ PriorityQueue (fast path)
//!                         ▲                                   │
//!                         │                                   ▼
//!                    retry layer                      AsyncWorker.poll()
//!                         ▲                                   │
//!                         │                               claim()
//!                    JobExecutor ◀──dispatch────────── Scheduler/Claimer
//!                         │
//!                  HandlerRegistry.get(job_type).invoke(payload)
//! ```
//!
//! In parallel, `HeartbeatService` keeps a per-worker fast-expiry marker
//! alive; the background stale sweep scans for expired markers and uses
//! the heartbeat service to reclaim jobs whose owner is gone.
//!
//! ## Key invariants
//!
//! 1. Every persisted job's observed transitions are edges in the state
//!    machine (`state_machine.rs`).
//! 2. `idempotency_key` is globally unique — enforced by the store, not
//!    the application.
//! 3. `retry_count` never exceeds `max_retries` and never decreases.
//! 4. A job claimed by a worker has `status = SCHEDULED` and
//!    `worker_id = <that worker>`, exactly once.
//!
//! ## What this is not
//!
//! Not an HTTP framework, not a metrics exporter, not a distributed
//! consensus system. No exactly-once execution across unrelated side
//! effects, no cross-datacenter replication, no cron/calendar recurrence
//! beyond a single `scheduled_at` instant.

pub mod aggregator;
pub mod background;
pub mod config;
pub mod dependency;
pub mod error;
pub mod executor;
pub mod heartbeat;
pub mod job;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod retry_layer;
pub mod state_machine;
pub mod store;
pub mod worker;
pub mod worker_runtime;
pub mod workflow;

#[cfg(test)]
mod scenarios;
#[cfg(test)]
mod stress_tests;

pub use aggregator::WorkflowAggregator;
pub use background::{BackgroundConfig, BackgroundHandle, BackgroundLoops};
pub use config::{ConfigError, SchedoraConfig};
pub use error::{Categorizable, Result, SchedoraError};
pub use executor::JobExecutor;
pub use heartbeat::{AssignmentTracker, HeartbeatMarker, HeartbeatService};
pub use job::{ErrorDetails, Job, JobStatus, NewJob, RetryPolicy};
pub use queue::{DlqEntry, PriorityQueue};
pub use registry::{FnHandler, Handler, HandlerRegistry};
pub use retry_layer::RetryLayer;
pub use store::{JobStore, WorkerStore, WorkflowStore};
pub use worker::{NewWorker, ResourceSample, Worker, WorkerStatus};
pub use worker_runtime::{AsyncWorker, WorkerConfig, WorkerCounters, WorkerHandle};
pub use workflow::{NewWorkflow, Workflow, WorkflowOverallStatus, WorkflowStatus};

pub use async_trait::async_trait;
