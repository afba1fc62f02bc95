//! Redis-backed side store for Schedora: the priority queue and its DLQ
//! overflow (C5), the worker heartbeat marker and assignment set (C10).
//!
//! Everything here is a *fast path* per §5's shared-resource policy —
//! losing this store degrades the engine to the scheduler's full-scan
//! claim and forces a stale sweep; it never corrupts durable state. Every
//! operation that talks to Redis maps connection failures to
//! `SchedoraError::SideStoreUnavailable` rather than a generic I/O error,
//! so callers can choose to tolerate it.

mod assignment_set;
mod heartbeat_marker;
mod priority_queue;

pub use assignment_set::RedisAssignmentTracker;
pub use heartbeat_marker::RedisHeartbeatMarker;
pub use priority_queue::RedisPriorityQueue;

use redis::aio::ConnectionManager;

/// Builds the three side-store connections from a single Redis URL. The
/// teacher's own side-store singletons are process-wide, created once at
/// startup and never recreated per-request; callers should hold this
/// bundle behind an `Arc` and share it.
pub async fn connect(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(redis_url)?;
    let conn = ConnectionManager::new(client).await?;
    Ok(conn)
}
