//! Postgres implementation of `WorkerStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schedora_core::error::{Result, SchedoraError};
use schedora_core::store::WorkerStore;
use schedora_core::worker::{NewWorker, ResourceSample, Worker, WorkerStatus};
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct PgWorkerStore {
    pool: PgPool,
}

impl PgWorkerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_worker(row: &sqlx::postgres::PgRow) -> anyhow::Result<Worker> {
        let status_str: String = row.get("status");
        Ok(Worker {
            worker_id: row.get("worker_id"),
            hostname: row.get("hostname"),
            pid: row.get("pid"),
            version: row.get("version"),
            max_concurrent_jobs: row.get("max_concurrent_jobs"),
            current_job_count: row.get("current_job_count"),
            jobs_processed: row.get("jobs_processed"),
            jobs_succeeded: row.get("jobs_succeeded"),
            jobs_failed: row.get("jobs_failed"),
            cpu_percent: row.get("cpu_percent"),
            memory_mb: row.get("memory_mb"),
            capabilities: row.get("capabilities"),
            metadata: row.get("metadata"),
            status: WorkerStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("invalid worker status in database: {status_str}"))?,
            started_at: row.get("started_at"),
            stopped_at: row.get("stopped_at"),
            last_heartbeat_at: row.get("last_heartbeat_at"),
        })
    }

    async fn fetch_one(&self, worker_id: &str) -> Result<Worker> {
        let row = sqlx::query("SELECT * FROM workers WHERE worker_id = $1")
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SchedoraError::Storage(e.into()))?
            .ok_or_else(|| SchedoraError::WorkerNotFound(worker_id.to_string()))?;
        Self::row_to_worker(&row).map_err(SchedoraError::Storage)
    }
}

#[async_trait]
impl WorkerStore for PgWorkerStore {
    async fn register(&self, new_worker: NewWorker) -> Result<Worker> {
        new_worker
            .validate()
            .map_err(|msg| SchedoraError::Storage(anyhow::anyhow!(msg)))?;

        sqlx::query(
            r#"
            INSERT INTO workers (
                worker_id, hostname, pid, version, max_concurrent_jobs,
                capabilities, metadata, status, started_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'ACTIVE', now())
            ON CONFLICT (worker_id) DO UPDATE SET
                hostname = EXCLUDED.hostname,
                pid = EXCLUDED.pid,
                version = EXCLUDED.version,
                max_concurrent_jobs = EXCLUDED.max_concurrent_jobs,
                capabilities = EXCLUDED.capabilities,
                metadata = EXCLUDED.metadata,
                status = 'ACTIVE',
                started_at = now(),
                stopped_at = NULL
            "#,
        )
        .bind(&new_worker.worker_id)
        .bind(&new_worker.hostname)
        .bind(new_worker.pid)
        .bind(&new_worker.version)
        .bind(new_worker.max_concurrent_jobs)
        .bind(&new_worker.capabilities)
        .bind(&new_worker.metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| SchedoraError::Storage(e.into()))?;

        self.fetch_one(&new_worker.worker_id).await
    }

    async fn get_worker(&self, worker_id: &str) -> Result<Worker> {
        self.fetch_one(worker_id).await
    }

    async fn list_workers(&self, status: Option<WorkerStatus>) -> Result<Vec<Worker>> {
        let rows = match status {
            Some(s) => {
                sqlx::query("SELECT * FROM workers WHERE status = $1")
                    .bind(s.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            None => sqlx::query("SELECT * FROM workers").fetch_all(&self.pool).await,
        }
        .map_err(|e| SchedoraError::Storage(e.into()))?;

        rows.iter()
            .map(Self::row_to_worker)
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(SchedoraError::Storage)
    }

    async fn heartbeat(&self, worker_id: &str, sample: Option<ResourceSample>) -> Result<Worker> {
        let (cpu, mem) = sample
            .map(|s| (s.cpu_percent, s.memory_mb))
            .unwrap_or((None, None));

        let row = sqlx::query(
            r#"
            UPDATE workers
            SET last_heartbeat_at = now(),
                cpu_percent = COALESCE($2, cpu_percent),
                memory_mb = COALESCE($3, memory_mb)
            WHERE worker_id = $1
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(cpu)
        .bind(mem)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchedoraError::Storage(e.into()))?
        .ok_or_else(|| SchedoraError::WorkerNotFound(worker_id.to_string()))?;

        Self::row_to_worker(&row).map_err(SchedoraError::Storage)
    }

    async fn mark_stale(&self, worker_id: &str) -> Result<Worker> {
        let row = sqlx::query(
            r#"
            UPDATE workers SET status = 'STALE'
            WHERE worker_id = $1 AND status = 'ACTIVE'
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchedoraError::Storage(e.into()))?;

        match row {
            Some(row) => Self::row_to_worker(&row).map_err(SchedoraError::Storage),
            None => self.fetch_one(worker_id).await,
        }
    }

    async fn deregister(&self, worker_id: &str) -> Result<Worker> {
        let row = sqlx::query(
            r#"
            UPDATE workers SET status = 'STOPPED', stopped_at = now()
            WHERE worker_id = $1
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchedoraError::Storage(e.into()))?
        .ok_or_else(|| SchedoraError::WorkerNotFound(worker_id.to_string()))?;

        Self::row_to_worker(&row).map_err(SchedoraError::Storage)
    }

    async fn adjust_job_count(&self, worker_id: &str, delta: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE workers
            SET current_job_count = GREATEST(0, LEAST(max_concurrent_jobs, current_job_count + $2))
            WHERE worker_id = $1
            "#,
        )
        .bind(worker_id)
        .bind(delta)
        .execute(&self.pool)
        .await
        .map_err(|e| SchedoraError::Storage(e.into()))?;
        Ok(())
    }

    async fn record_completion(&self, worker_id: &str, succeeded: bool) -> Result<()> {
        let query = if succeeded {
            "UPDATE workers SET jobs_processed = jobs_processed + 1, jobs_succeeded = jobs_succeeded + 1 WHERE worker_id = $1"
        } else {
            "UPDATE workers SET jobs_processed = jobs_processed + 1, jobs_failed = jobs_failed + 1 WHERE worker_id = $1"
        };
        sqlx::query(query)
            .bind(worker_id)
            .execute(&self.pool)
            .await
            .map_err(|e| SchedoraError::Storage(e.into()))?;
        Ok(())
    }

    async fn delete_stopped_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM workers WHERE status = 'STOPPED' AND stopped_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| SchedoraError::Storage(e.into()))?;
        Ok(result.rows_affected())
    }
}
