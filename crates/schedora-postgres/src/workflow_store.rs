//! Postgres implementation of `WorkflowStore`.

use async_trait::async_trait;
use schedora_core::error::{Result, SchedoraError};
use schedora_core::job::{ErrorDetails, Job, JobStatus, RetryPolicy};
use schedora_core::store::WorkflowStore;
use schedora_core::workflow::{NewWorkflow, Workflow};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_workflow(row: &sqlx::postgres::PgRow) -> Workflow {
        Workflow {
            workflow_id: row.get("workflow_id"),
            name: row.get("name"),
            description: row.get("description"),
            config: row.get("config"),
            created_at: row.get("created_at"),
        }
    }

    fn row_to_job(row: &sqlx::postgres::PgRow) -> anyhow::Result<Job> {
        let status_str: String = row.get("status");
        let retry_policy_str: String = row.get("retry_policy");
        let error_details: Option<Value> = row.get("error_details");
        Ok(Job {
            job_id: row.get("job_id"),
            idempotency_key: row.get("idempotency_key"),
            job_type: row.get("job_type"),
            payload: row.get("payload"),
            priority: row.get("priority"),
            scheduled_at: row.get("scheduled_at"),
            max_retries: row.get("max_retries"),
            retry_count: row.get("retry_count"),
            retry_policy: RetryPolicy::from_str(&retry_policy_str)
                .ok_or_else(|| anyhow::anyhow!("invalid retry_policy in database"))?,
            timeout_seconds: row.get("timeout_seconds"),
            status: JobStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("invalid status in database"))?,
            worker_id: row.get("worker_id"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            error_message: row.get("error_message"),
            error_details: error_details.and_then(|v| serde_json::from_value::<ErrorDetails>(v).ok()),
            result: row.get("result"),
            // Dependency edges are not needed for workflow status
            // aggregation; left empty rather than issuing one extra query
            // per job here (the job store is the place to fetch them).
            dependencies: vec![],
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn create_workflow(&self, new_workflow: NewWorkflow) -> Result<Workflow> {
        let workflow_id = Uuid::new_v4();
        let insert = sqlx::query(
            "INSERT INTO workflows (workflow_id, name, description, config) VALUES ($1, $2, $3, $4)",
        )
        .bind(workflow_id)
        .bind(&new_workflow.name)
        .bind(&new_workflow.description)
        .bind(&new_workflow.config)
        .execute(&self.pool)
        .await;

        if let Err(sqlx::Error::Database(db_err)) = &insert {
            if db_err.is_unique_violation() {
                return Err(SchedoraError::DuplicateWorkflowName(new_workflow.name.clone()));
            }
        }
        insert.map_err(|e| SchedoraError::Storage(e.into()))?;

        self.get_workflow(workflow_id).await
    }

    async fn get_workflow(&self, workflow_id: Uuid) -> Result<Workflow> {
        let row = sqlx::query("SELECT * FROM workflows WHERE workflow_id = $1")
            .bind(workflow_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SchedoraError::Storage(e.into()))?
            .ok_or(SchedoraError::WorkflowNotFound(workflow_id))?;
        Ok(Self::row_to_workflow(&row))
    }

    async fn attach_job(&self, workflow_id: Uuid, job_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO workflow_jobs (workflow_id, job_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(workflow_id)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| SchedoraError::Storage(e.into()))?;
        Ok(())
    }

    async fn jobs_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<Job>> {
        let rows = sqlx::query(
            r#"
            SELECT j.* FROM jobs j
            JOIN workflow_jobs wj ON wj.job_id = j.job_id
            WHERE wj.workflow_id = $1
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SchedoraError::Storage(e.into()))?;

        rows.iter()
            .map(Self::row_to_job)
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(SchedoraError::Storage)
    }
}
