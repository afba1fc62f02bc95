//! C12: the workflow aggregator. A workflow is never itself executed —
//! this module only rolls up the status of the jobs attached to it.

use crate::job::{Job, JobStatus};
use crate::store::{JobStore, WorkflowStore};
use crate::workflow::{WorkflowOverallStatus, WorkflowStatus};
use std::sync::Arc;
use uuid::Uuid;

/// Pure rollup over a slice of job statuses, so the rule itself is
/// testable without a store.
pub fn aggregate(statuses: &[JobStatus]) -> WorkflowStatus {
    let total = statuses.len() as u64;
    let completed = statuses.iter().filter(|s| **s == JobStatus::Success).count() as u64;
    let failed = statuses
        .iter()
        .filter(|s| matches!(s, JobStatus::Failed | JobStatus::Dead | JobStatus::Canceled))
        .count() as u64;
    let running = statuses
        .iter()
        .filter(|s| matches!(s, JobStatus::Running | JobStatus::Scheduled))
        .count() as u64;

    let overall = if failed > 0 {
        WorkflowOverallStatus::Failed
    } else if total > 0 && completed == total {
        WorkflowOverallStatus::Completed
    } else if running > 0 {
        WorkflowOverallStatus::Running
    } else {
        WorkflowOverallStatus::Pending
    };

    WorkflowStatus {
        total,
        completed,
        failed,
        running,
        overall,
    }
}

pub struct WorkflowAggregator<WF, J> {
    workflow_store: Arc<WF>,
    job_store: Arc<J>,
}

impl<WF, J> WorkflowAggregator<WF, J>
where
    WF: WorkflowStore,
    J: JobStore,
{
    pub fn new(workflow_store: Arc<WF>, job_store: Arc<J>) -> Self {
        Self {
            workflow_store,
            job_store,
        }
    }

    pub async fn status(&self, workflow_id: Uuid) -> crate::error::Result<WorkflowStatus> {
        let jobs: Vec<Job> = self.workflow_store.jobs_for_workflow(workflow_id).await?;
        let statuses: Vec<JobStatus> = jobs.iter().map(|j| j.status).collect();
        Ok(aggregate(&statuses))
    }

    pub fn job_store(&self) -> &Arc<J> {
        &self.job_store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use JobStatus::*;

    #[test]
    fn empty_workflow_is_pending() {
        let status = aggregate(&[]);
        assert_eq!(status.overall, WorkflowOverallStatus::Pending);
        assert_eq!(status.total, 0);
    }

    #[test]
    fn all_success_is_completed() {
        let status = aggregate(&[Success, Success]);
        assert_eq!(status.overall, WorkflowOverallStatus::Completed);
        assert_eq!(status.completed, 2);
    }

    #[test]
    fn any_failure_wins_over_completion() {
        let status = aggregate(&[Success, Success, Dead]);
        assert_eq!(status.overall, WorkflowOverallStatus::Failed);
        assert_eq!(status.failed, 1);
    }

    #[test]
    fn in_flight_jobs_without_failures_are_running() {
        let status = aggregate(&[Success, Running, Pending]);
        assert_eq!(status.overall, WorkflowOverallStatus::Running);
        assert_eq!(status.running, 1);
    }

    #[test]
    fn only_pending_jobs_is_pending() {
        let status = aggregate(&[Pending, Pending]);
        assert_eq!(status.overall, WorkflowOverallStatus::Pending);
    }
}
