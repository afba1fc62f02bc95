//! The fast-expiry heartbeat marker: `worker:{id}:heartbeat` with TTL =
//! `heartbeat_timeout`. Its disappearance, not a flag, is the stale
//! signal (§4.10).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use schedora_core::error::{Result, SchedoraError};
use schedora_core::heartbeat::HeartbeatMarker;
use std::time::Duration;

#[derive(Clone)]
pub struct RedisHeartbeatMarker {
    conn: ConnectionManager,
}

impl RedisHeartbeatMarker {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn key(worker_id: &str) -> String {
        format!("worker:{worker_id}:heartbeat")
    }

    fn unavailable(e: redis::RedisError) -> SchedoraError {
        SchedoraError::SideStoreUnavailable(e.to_string())
    }
}

#[async_trait]
impl HeartbeatMarker for RedisHeartbeatMarker {
    #[tracing::instrument(skip(self), fields(worker_id, ttl_secs = ttl.as_secs()))]
    async fn install(&self, worker_id: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(Self::key(worker_id), "1", ttl.as_secs().max(1))
            .await
            .map_err(|e| {
                tracing::warn!(worker_id, error = %e, "failed to install heartbeat marker");
                Self::unavailable(e)
            })?;
        Ok(())
    }

    async fn refresh(&self, worker_id: &str, ttl: Duration) -> Result<()> {
        self.install(worker_id, ttl).await
    }

    #[tracing::instrument(skip(self), fields(worker_id))]
    async fn is_alive(&self, worker_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(Self::key(worker_id)).await.map_err(|e| {
            tracing::warn!(worker_id, error = %e, "failed to read heartbeat marker");
            Self::unavailable(e)
        })?;
        Ok(exists)
    }

    #[tracing::instrument(skip(self), fields(worker_id))]
    async fn remove(&self, worker_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::key(worker_id)).await.map_err(Self::unavailable)?;
        Ok(())
    }
}
