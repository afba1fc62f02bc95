//! The per-worker assignment set: `worker:{id}:jobs`, used for stale
//! reclaim (§4.10/§4.11).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use schedora_core::error::{Result, SchedoraError};
use schedora_core::heartbeat::AssignmentTracker;
use uuid::Uuid;

#[derive(Clone)]
pub struct RedisAssignmentTracker {
    conn: ConnectionManager,
}

impl RedisAssignmentTracker {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn key(worker_id: &str) -> String {
        format!("worker:{worker_id}:jobs")
    }

    fn unavailable(e: redis::RedisError) -> SchedoraError {
        SchedoraError::SideStoreUnavailable(e.to_string())
    }
}

#[async_trait]
impl AssignmentTracker for RedisAssignmentTracker {
    #[tracing::instrument(skip(self), fields(worker_id, %job_id))]
    async fn assign(&self, worker_id: &str, job_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .sadd(Self::key(worker_id), job_id.to_string())
            .await
            .map_err(|e| {
                tracing::warn!(worker_id, %job_id, error = %e, "failed to record job assignment");
                Self::unavailable(e)
            })?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(worker_id, %job_id))]
    async fn unassign(&self, worker_id: &str, job_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .srem(Self::key(worker_id), job_id.to_string())
            .await
            .map_err(Self::unavailable)?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(worker_id))]
    async fn assignments(&self, worker_id: &str) -> Result<Vec<Uuid>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.smembers(Self::key(worker_id)).await.map_err(|e| {
            tracing::warn!(worker_id, error = %e, "failed to read job assignments");
            Self::unavailable(e)
        })?;
        Ok(raw.into_iter().filter_map(|s| Uuid::parse_str(&s).ok()).collect())
    }

    #[tracing::instrument(skip(self), fields(worker_id))]
    async fn clear(&self, worker_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::key(worker_id)).await.map_err(Self::unavailable)?;
        Ok(())
    }
}
