//! Redis-backed priority queue + DLQ (C5), keyed under
//! `schedora:queue:{name}` per §6's persisted state layout.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use schedora_core::error::{Result, SchedoraError};
use schedora_core::queue::{DlqEntry, PriorityQueue};
use uuid::Uuid;

#[derive(Clone)]
pub struct RedisPriorityQueue {
    conn: ConnectionManager,
    name: String,
}

impl RedisPriorityQueue {
    pub fn new(conn: ConnectionManager, name: impl Into<String>) -> Self {
        Self { conn, name: name.into() }
    }

    fn queue_key(&self) -> String {
        format!("schedora:queue:{}", self.name)
    }

    fn dlq_key(&self) -> String {
        format!("schedora:queue:{}:dlq", self.name)
    }

    fn unavailable(e: redis::RedisError) -> SchedoraError {
        SchedoraError::SideStoreUnavailable(e.to_string())
    }
}

#[async_trait]
impl PriorityQueue for RedisPriorityQueue {
    #[tracing::instrument(skip(self), fields(queue = %self.name, %job_id))]
    async fn enqueue(&self, job_id: Uuid, priority: i16) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zadd(self.queue_key(), job_id.to_string(), priority as f64)
            .await
            .map_err(|e| {
                tracing::warn!(queue = %self.name, %job_id, error = %e, "failed to enqueue job");
                Self::unavailable(e)
            })?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(queue = %self.name))]
    async fn dequeue(&self) -> Result<Option<Uuid>> {
        let mut conn = self.conn.clone();
        let popped: Vec<(String, f64)> = conn
            .zpopmax(self.queue_key(), 1)
            .await
            .map_err(Self::unavailable)?;
        Ok(popped.into_iter().next().and_then(|(id, _)| Uuid::parse_str(&id).ok()))
    }

    #[tracing::instrument(skip(self), fields(queue = %self.name))]
    async fn peek(&self) -> Result<Option<Uuid>> {
        let mut conn = self.conn.clone();
        let top: Vec<(String, f64)> = conn
            .zrevrange_withscores(self.queue_key(), 0, 0)
            .await
            .map_err(Self::unavailable)?;
        Ok(top.into_iter().next().and_then(|(id, _)| Uuid::parse_str(&id).ok()))
    }

    #[tracing::instrument(skip(self), fields(queue = %self.name, %job_id))]
    async fn remove(&self, job_id: Uuid) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .zrem(self.queue_key(), job_id.to_string())
            .await
            .map_err(Self::unavailable)?;
        Ok(removed > 0)
    }

    async fn length(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        conn.zcard(self.queue_key()).await.map_err(Self::unavailable)
    }

    async fn dlq_length(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        conn.hlen(self.dlq_key()).await.map_err(Self::unavailable)
    }

    #[tracing::instrument(skip(self), fields(queue = %self.name))]
    async fn purge(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.queue_key()).await.map_err(Self::unavailable)?;
        tracing::info!(queue = %self.name, "queue purged");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(queue = %self.name))]
    async fn purge_dlq(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.dlq_key()).await.map_err(Self::unavailable)?;
        tracing::info!(queue = %self.name, "dead-letter queue purged");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(queue = %self.name, %job_id, reason))]
    async fn move_to_dlq(&self, job_id: Uuid, reason: &str, retry_count: i32) -> Result<()> {
        let entry = DlqEntry {
            job_id,
            reason: reason.to_string(),
            retry_count,
            moved_at: Utc::now(),
        };
        let json = serde_json::to_string(&entry).map_err(|e| SchedoraError::Storage(e.into()))?;

        let mut conn = self.conn.clone();
        let _: () = conn
            .hset(self.dlq_key(), job_id.to_string(), json)
            .await
            .map_err(|e| {
                tracing::warn!(queue = %self.name, %job_id, error = %e, "failed to write dead-letter entry");
                Self::unavailable(e)
            })?;
        let _: () = conn
            .zrem(self.queue_key(), job_id.to_string())
            .await
            .map_err(Self::unavailable)?;
        tracing::info!(queue = %self.name, %job_id, reason, retry_count, "job moved to dead-letter queue");
        Ok(())
    }

    async fn dlq_entries(&self) -> Result<Vec<DlqEntry>> {
        let mut conn = self.conn.clone();
        let raw: Vec<(String, String)> = conn.hgetall(self.dlq_key()).await.map_err(Self::unavailable)?;
        Ok(raw
            .into_iter()
            .filter_map(|(_, json)| serde_json::from_str(&json).ok())
            .collect())
    }
}
