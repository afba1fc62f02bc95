//! C5: the priority queue contract — a score-ordered fast path in front of
//! the durable store, plus its dead-letter overflow.
//!
//! This is a *cache*: losing it degrades claiming to the scheduler's
//! full-scan path (`JobStore::claim_batch`) rather than corrupting
//! anything. Implementations live in `schedora-queue` (Redis-backed); an
//! in-memory one lives in `schedora-testing`.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recovered from the original Python DLQ entry, which also records the
/// retry count at time of death — useful for diagnosing a dead job
/// without a second round-trip to the durable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub job_id: Uuid,
    pub reason: String,
    pub retry_count: i32,
    pub moved_at: DateTime<Utc>,
}

#[async_trait]
pub trait PriorityQueue: Send + Sync {
    /// Idempotent insert-or-update of `job_id`'s score.
    async fn enqueue(&self, job_id: Uuid, priority: i16) -> Result<()>;

    /// Pops the single entry with the maximum score. Ties break
    /// arbitrarily but deterministically within one caller. `None` on an
    /// empty queue.
    async fn dequeue(&self) -> Result<Option<Uuid>>;

    /// Same selection as `dequeue`, non-destructive.
    async fn peek(&self) -> Result<Option<Uuid>>;

    /// Returns whether `job_id` was present.
    async fn remove(&self, job_id: Uuid) -> Result<bool>;

    async fn length(&self) -> Result<u64>;
    async fn dlq_length(&self) -> Result<u64>;

    async fn purge(&self) -> Result<()>;
    async fn purge_dlq(&self) -> Result<()>;

    async fn move_to_dlq(&self, job_id: Uuid, reason: &str, retry_count: i32) -> Result<()>;
    async fn dlq_entries(&self) -> Result<Vec<DlqEntry>>;
}
