//! Postgres implementation of `JobStore`.
//!
//! Grounded directly on the teacher's `PgJobStore`: the same
//! `FOR UPDATE SKIP LOCKED` claim shape and `sqlx::query` + `Row::get`
//! style (no compile-time `query!` macros, since this crate has no
//! database available at build time), extended with the dependency
//! predicate folded into the claim scan, per §4.3 obligation 2.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schedora_core::error::{Result, SchedoraError};
use schedora_core::job::{ErrorDetails, Job, JobStatus, NewJob, RetryPolicy};
use schedora_core::store::JobStore;
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_dependencies(&self, job_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
        let rows = sqlx::query("SELECT depends_on_job_id FROM job_dependencies WHERE job_id = $1")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("depends_on_job_id")).collect())
    }

    async fn row_to_job(&self, row: &sqlx::postgres::PgRow) -> anyhow::Result<Job> {
        let job_id: Uuid = row.get("job_id");
        let status_str: String = row.get("status");
        let retry_policy_str: String = row.get("retry_policy");
        let error_details: Option<Value> = row.get("error_details");

        Ok(Job {
            job_id,
            idempotency_key: row.get("idempotency_key"),
            job_type: row.get("job_type"),
            payload: row.get("payload"),
            priority: row.get("priority"),
            scheduled_at: row.get("scheduled_at"),
            max_retries: row.get("max_retries"),
            retry_count: row.get("retry_count"),
            retry_policy: RetryPolicy::from_str(&retry_policy_str)
                .context("invalid retry_policy in database")?,
            timeout_seconds: row.get("timeout_seconds"),
            status: JobStatus::from_str(&status_str).context("invalid status in database")?,
            worker_id: row.get("worker_id"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            error_message: row.get("error_message"),
            error_details: error_details.and_then(|v| serde_json::from_value::<ErrorDetails>(v).ok()),
            result: row.get("result"),
            dependencies: self.load_dependencies(job_id).await?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    async fn rows_to_jobs(&self, rows: Vec<sqlx::postgres::PgRow>) -> anyhow::Result<Vec<Job>> {
        let mut jobs = Vec::with_capacity(rows.len());
        for row in &rows {
            jobs.push(self.row_to_job(row).await?);
        }
        Ok(jobs)
    }

    async fn fetch_one_job(&self, job_id: Uuid) -> Result<Job> {
        let row = sqlx::query("SELECT * FROM jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SchedoraError::Storage(e.into()))?
            .ok_or(SchedoraError::JobNotFound(job_id))?;
        self.row_to_job(&row).await.map_err(SchedoraError::Storage)
    }
}

const DEPENDENCY_PREDICATE: &str = r#"
    NOT EXISTS (
        SELECT 1 FROM job_dependencies jd
        JOIN jobs p ON p.job_id = jd.depends_on_job_id
        WHERE jd.job_id = jobs.job_id AND p.status <> 'SUCCESS'
    )
"#;

const FAILED_DEPENDENCY_PREDICATE: &str = r#"
    EXISTS (
        SELECT 1 FROM job_dependencies jd
        JOIN jobs p ON p.job_id = jd.depends_on_job_id
        WHERE jd.job_id = jobs.job_id AND p.status IN ('FAILED', 'DEAD', 'CANCELED')
    )
"#;

#[async_trait]
impl JobStore for PgJobStore {
    #[tracing::instrument(skip(self, new_job), fields(idempotency_key = %new_job.idempotency_key))]
    async fn insert_job(&self, new_job: NewJob) -> Result<Job> {
        new_job
            .validate()
            .map_err(|msg| SchedoraError::Storage(anyhow::anyhow!(msg)))?;

        let job_id = Uuid::new_v4();
        let scheduled_at = new_job.scheduled_at.unwrap_or_else(Utc::now);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SchedoraError::Storage(e.into()))?;

        let insert = sqlx::query(
            r#"
            INSERT INTO jobs (
                job_id, idempotency_key, job_type, payload, priority, scheduled_at,
                max_retries, retry_policy, timeout_seconds
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(job_id)
        .bind(&new_job.idempotency_key)
        .bind(&new_job.job_type)
        .bind(&new_job.payload)
        .bind(new_job.priority)
        .bind(scheduled_at)
        .bind(new_job.max_retries)
        .bind(new_job.retry_policy.as_str())
        .bind(new_job.timeout_seconds)
        .execute(&mut *tx)
        .await;

        if let Err(sqlx::Error::Database(db_err)) = &insert {
            if db_err.is_unique_violation() {
                // A concurrent insert with the same key may have won the
                // race; look it up so the caller gets the surviving row.
                let existing: Option<Uuid> = sqlx::query("SELECT job_id FROM jobs WHERE idempotency_key = $1")
                    .bind(&new_job.idempotency_key)
                    .fetch_optional(&self.pool)
                    .await
                    .ok()
                    .flatten()
                    .map(|row| row.get("job_id"));
                return Err(SchedoraError::DuplicateIdempotencyKey {
                    key: new_job.idempotency_key.clone(),
                    existing_job_id: existing.unwrap_or(job_id),
                });
            }
        }
        insert.map_err(|e| SchedoraError::Storage(e.into()))?;

        if let Some(parent_id) = new_job.parent_job_id {
            sqlx::query("INSERT INTO job_dependencies (job_id, depends_on_job_id) VALUES ($1, $2)")
                .bind(job_id)
                .bind(parent_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| SchedoraError::Storage(e.into()))?;
        }

        tx.commit().await.map_err(|e| SchedoraError::Storage(e.into()))?;

        self.fetch_one_job(job_id).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Job> {
        self.fetch_one_job(job_id).await
    }

    async fn cancel_job(&self, job_id: Uuid) -> Result<Job> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'CANCELED', updated_at = now()
            WHERE job_id = $1
              AND status IN ('PENDING', 'SCHEDULED', 'RUNNING')
            RETURNING *
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchedoraError::Storage(e.into()))?;

        match row {
            Some(row) => self.row_to_job(&row).await.map_err(SchedoraError::Storage),
            None => {
                // Either the job doesn't exist, or it's already terminal.
                let job = self.fetch_one_job(job_id).await?;
                Err(SchedoraError::InvalidStateTransition {
                    from: job.status,
                    to: JobStatus::Canceled,
                })
            }
        }
    }

    #[tracing::instrument(skip(self), fields(worker_id))]
    async fn claim_batch(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
        let query = format!(
            r#"
            WITH claimable AS (
                SELECT job_id
                FROM jobs
                WHERE status = 'PENDING'
                  AND scheduled_at <= now()
                  AND {DEPENDENCY_PREDICATE}
                ORDER BY priority DESC, scheduled_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'SCHEDULED', worker_id = $2, updated_at = now()
            WHERE job_id IN (SELECT job_id FROM claimable)
            RETURNING *
            "#
        );

        let rows = sqlx::query(&query)
            .bind(limit)
            .bind(worker_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchedoraError::Storage(e.into()))?;

        self.rows_to_jobs(rows).await.map_err(SchedoraError::Storage)
    }

    async fn claim_optimistic(&self, job_id: Uuid, worker_id: &str) -> Result<Option<Job>> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'SCHEDULED', worker_id = $2, updated_at = now()
            WHERE job_id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchedoraError::Storage(e.into()))?;

        match row {
            Some(row) => Ok(Some(self.row_to_job(&row).await.map_err(SchedoraError::Storage)?)),
            None => Ok(None),
        }
    }

    async fn mark_running(&self, job_id: Uuid) -> Result<Job> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'RUNNING', started_at = now(), updated_at = now()
            WHERE job_id = $1 AND status IN ('PENDING', 'SCHEDULED')
            RETURNING *
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchedoraError::Storage(e.into()))?;

        match row {
            Some(row) => self.row_to_job(&row).await.map_err(SchedoraError::Storage),
            None => {
                let job = self.fetch_one_job(job_id).await?;
                Err(SchedoraError::InvalidStateTransition {
                    from: job.status,
                    to: JobStatus::Running,
                })
            }
        }
    }

    async fn mark_success(&self, job_id: Uuid, result: Value) -> Result<Job> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'SUCCESS', completed_at = now(), result = $2, updated_at = now()
            WHERE job_id = $1 AND status = 'RUNNING'
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(&result)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchedoraError::Storage(e.into()))?;

        match row {
            Some(row) => self.row_to_job(&row).await.map_err(SchedoraError::Storage),
            None => {
                let job = self.fetch_one_job(job_id).await?;
                Err(SchedoraError::InvalidStateTransition {
                    from: job.status,
                    to: JobStatus::Success,
                })
            }
        }
    }

    async fn mark_failed(&self, job_id: Uuid, error_message: &str, error_details: Value) -> Result<Job> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'FAILED', completed_at = now(),
                error_message = $2, error_details = $3, updated_at = now()
            WHERE job_id = $1 AND status = 'RUNNING'
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(error_message)
        .bind(&error_details)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchedoraError::Storage(e.into()))?;

        match row {
            Some(row) => self.row_to_job(&row).await.map_err(SchedoraError::Storage),
            None => {
                let job = self.fetch_one_job(job_id).await?;
                Err(SchedoraError::InvalidStateTransition {
                    from: job.status,
                    to: JobStatus::Failed,
                })
            }
        }
    }

    async fn mark_retrying_scheduled(&self, job_id: Uuid, next_scheduled_at: DateTime<Utc>) -> Result<Job> {
        // FAILED -> RETRYING -> SCHEDULED collapsed into one update: the
        // intermediate RETRYING status is never durably visible, it is an
        // accounting fiction the transition table names so callers reason
        // about it explicitly.
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'SCHEDULED', retry_count = retry_count + 1,
                scheduled_at = $2, worker_id = NULL, updated_at = now()
            WHERE job_id = $1 AND status = 'FAILED'
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(next_scheduled_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchedoraError::Storage(e.into()))?;

        match row {
            Some(row) => self.row_to_job(&row).await.map_err(SchedoraError::Storage),
            None => {
                let job = self.fetch_one_job(job_id).await?;
                Err(SchedoraError::InvalidStateTransition {
                    from: job.status,
                    to: JobStatus::Retrying,
                })
            }
        }
    }

    async fn mark_dead(&self, job_id: Uuid) -> Result<Job> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'DEAD', updated_at = now()
            WHERE job_id = $1 AND status = 'FAILED'
            RETURNING *
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchedoraError::Storage(e.into()))?;

        match row {
            Some(row) => self.row_to_job(&row).await.map_err(SchedoraError::Storage),
            None => {
                let job = self.fetch_one_job(job_id).await?;
                Err(SchedoraError::InvalidStateTransition {
                    from: job.status,
                    to: JobStatus::Dead,
                })
            }
        }
    }

    async fn reclaim_to_pending(&self, job_id: Uuid) -> Result<Option<Job>> {
        // Deliberately bypasses the transition table: this is a
        // crash-recovery override (§4.10), not a normal edge. Jobs not
        // currently RUNNING are left untouched, not errored.
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'PENDING', worker_id = NULL, updated_at = now()
            WHERE job_id = $1 AND status = 'RUNNING'
            RETURNING *
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SchedoraError::Storage(e.into()))?;

        match row {
            Some(row) => Ok(Some(self.row_to_job(&row).await.map_err(SchedoraError::Storage)?)),
            None => Ok(None),
        }
    }

    async fn ready_jobs(&self, limit: i64) -> Result<Vec<Job>> {
        let query = format!(
            r#"
            SELECT * FROM jobs
            WHERE status = 'PENDING' AND scheduled_at <= now() AND {DEPENDENCY_PREDICATE}
            ORDER BY priority DESC, scheduled_at ASC
            LIMIT $1
            "#
        );
        let rows = sqlx::query(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchedoraError::Storage(e.into()))?;
        self.rows_to_jobs(rows).await.map_err(SchedoraError::Storage)
    }

    async fn blocked_jobs(&self) -> Result<Vec<Job>> {
        let query = format!(
            r#"
            SELECT * FROM jobs
            WHERE status = 'PENDING' AND {FAILED_DEPENDENCY_PREDICATE}
            "#
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchedoraError::Storage(e.into()))?;
        self.rows_to_jobs(rows).await.map_err(SchedoraError::Storage)
    }
}
