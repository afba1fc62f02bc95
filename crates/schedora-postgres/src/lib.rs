//! PostgreSQL implementation of the Schedora durable store.
//!
//! This crate provides a production-ready PostgreSQL implementation of the
//! `JobStore`, `WorkerStore` and `WorkflowStore` traits from
//! `schedora-core`.
//!
//! # Features
//!
//! - `FOR UPDATE SKIP LOCKED` claiming with the dependency predicate
//!   folded into the scan
//! - Exponential/jittered retry scheduling via the outer retry layer
//! - Dead letter queue hand-off through the priority queue crate
//! - Worker heartbeats, resource samples and stale-worker reclaim
//! - Check constraints enforced at write time (priority range, retry
//!   bounds, timestamp ordering, worker counters)
//!
//! # Database Schema
//!
//! See `migrations/0001_init.sql` for the authoritative schema: `jobs`,
//! `job_dependencies` (self-referential many-to-many), `workers`,
//! `workflows`, `workflow_jobs`. Every enum is a `TEXT` column with a
//! `CHECK` constraint, never a Postgres `ENUM` type, so the transition
//! table in `schedora_core::state_machine` can grow without a schema
//! migration.
//!
//! # Usage
//!
//! ```rust,ignore
//! use schedora_postgres::PgJobStore;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/schedora").await?;
//! let store = PgJobStore::new(pool);
//! ```

mod job_store;
mod worker_store;
mod workflow_store;

pub use job_store::PgJobStore;
pub use worker_store::PgWorkerStore;
pub use workflow_store::PgWorkflowStore;

/// Embeds the crate's migrations for callers that want to run them via
/// `sqlx::migrate!` at startup rather than an external migration step.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
