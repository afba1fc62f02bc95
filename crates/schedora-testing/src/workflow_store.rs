//! In-memory `WorkflowStore`, backed by a `DashMap`.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use schedora_core::error::{Result, SchedoraError};
use schedora_core::job::Job;
use schedora_core::store::{JobStore, WorkflowStore};
use schedora_core::workflow::{NewWorkflow, Workflow};
use std::sync::Arc;
use uuid::Uuid;

use crate::job_store::InMemoryJobStore;

#[derive(Default)]
pub struct InMemoryWorkflowStore {
    workflows: DashMap<Uuid, Workflow>,
    by_name: DashMap<String, Uuid>,
    jobs_by_workflow: DashMap<Uuid, Vec<Uuid>>,
    job_store: Arc<InMemoryJobStore>,
}

impl InMemoryWorkflowStore {
    /// Workflow status aggregation needs to read job rows, so this store
    /// shares a job store with the rest of the fixture rather than keeping
    /// its own copy of job state.
    pub fn new(job_store: Arc<InMemoryJobStore>) -> Self {
        Self {
            job_store,
            ..Default::default()
        }
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create_workflow(&self, new_workflow: NewWorkflow) -> Result<Workflow> {
        if self.by_name.contains_key(&new_workflow.name) {
            return Err(SchedoraError::DuplicateWorkflowName(new_workflow.name));
        }
        let workflow_id = Uuid::new_v4();
        let workflow = Workflow {
            workflow_id,
            name: new_workflow.name.clone(),
            description: new_workflow.description,
            config: new_workflow.config,
            created_at: Utc::now(),
        };
        self.by_name.insert(new_workflow.name, workflow_id);
        self.workflows.insert(workflow_id, workflow.clone());
        self.jobs_by_workflow.insert(workflow_id, Vec::new());
        Ok(workflow)
    }

    async fn get_workflow(&self, workflow_id: Uuid) -> Result<Workflow> {
        self.workflows
            .get(&workflow_id)
            .map(|w| w.clone())
            .ok_or(SchedoraError::WorkflowNotFound(workflow_id))
    }

    async fn attach_job(&self, workflow_id: Uuid, job_id: Uuid) -> Result<()> {
        if !self.workflows.contains_key(&workflow_id) {
            return Err(SchedoraError::WorkflowNotFound(workflow_id));
        }
        let mut jobs = self.jobs_by_workflow.entry(workflow_id).or_default();
        if !jobs.contains(&job_id) {
            jobs.push(job_id);
        }
        Ok(())
    }

    async fn jobs_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<Job>> {
        let job_ids = self
            .jobs_by_workflow
            .get(&workflow_id)
            .map(|v| v.clone())
            .unwrap_or_default();
        let mut jobs = Vec::with_capacity(job_ids.len());
        for job_id in job_ids {
            jobs.push(self.job_store.get_job(job_id).await?);
        }
        Ok(jobs)
    }
}
