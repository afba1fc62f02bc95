//! End-to-end scenarios exercising the full claim/execute/retry/reclaim
//! path against the in-memory stores, rather than any single module in
//! isolation.

use crate::executor::JobExecutor;
use crate::heartbeat::{AssignmentTracker, HeartbeatService};
use crate::job::JobStatus;
use crate::queue::PriorityQueue;
use crate::registry::{FnHandler, HandlerRegistry};
use crate::retry_layer::RetryLayer;
use crate::store::{JobStore, WorkflowStore};
use crate::worker::NewWorker;
use crate::workflow::WorkflowOverallStatus;
use schedora_testing::{
    InMemoryAssignmentTracker, InMemoryHeartbeatMarker, InMemoryJobStore, InMemoryPriorityQueue,
    InMemoryWorkerStore, InMemoryWorkflowStore, JobFactory, WorkflowFactory,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn echo_registry() -> Arc<HandlerRegistry> {
    let registry = HandlerRegistry::new();
    registry
        .register("echo", Arc::new(FnHandler(|p: serde_json::Value| async move { Ok(p) })))
        .unwrap();
    Arc::new(registry)
}

/// S1: a simple job submitted, claimed, and executed successfully ends up
/// `SUCCESS` with its handler's result attached.
#[tokio::test]
async fn simple_success() {
    let jobs = Arc::new(InMemoryJobStore::new());
    let job = jobs
        .insert_job(JobFactory::new().job_type("echo").payload(json!({"n": 1})).build())
        .await
        .unwrap();

    let claimed = jobs.claim_batch("worker-1", 10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].job_id, job.job_id);

    let executor = JobExecutor::new(jobs.clone(), echo_registry());
    let finished = executor.execute(claimed.into_iter().next().unwrap()).await.unwrap();

    assert_eq!(finished.status, JobStatus::Success);
    assert_eq!(finished.result, Some(json!({"n": 1})));
}

/// S2: submitting the same idempotency key twice fails the second insert
/// and names the surviving job.
#[tokio::test]
async fn duplicate_idempotency_key_is_rejected() {
    let jobs = Arc::new(InMemoryJobStore::new());
    let first = jobs
        .insert_job(JobFactory::new().idempotency_key("checkout-42").build())
        .await
        .unwrap();

    let err = jobs
        .insert_job(JobFactory::new().idempotency_key("checkout-42").build())
        .await
        .unwrap_err();

    match err {
        crate::error::SchedoraError::DuplicateIdempotencyKey { key, existing_job_id } => {
            assert_eq!(key, "checkout-42");
            assert_eq!(existing_job_id, first.job_id);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

/// S3: the priority queue fast path pops the highest-priority job first,
/// and the durable claim underneath it is still exclusive.
#[tokio::test]
async fn priority_ordering_via_queue() {
    let jobs = Arc::new(InMemoryJobStore::new());
    let queue = InMemoryPriorityQueue::new();

    let low = jobs.insert_job(JobFactory::new().priority(1).build()).await.unwrap();
    let high = jobs.insert_job(JobFactory::new().priority(9).build()).await.unwrap();
    let mid = jobs.insert_job(JobFactory::new().priority(5).build()).await.unwrap();

    queue.enqueue(low.job_id, low.priority).await.unwrap();
    queue.enqueue(high.job_id, high.priority).await.unwrap();
    queue.enqueue(mid.job_id, mid.priority).await.unwrap();

    let popped = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(popped, high.job_id);

    let claimed = jobs.claim_optimistic(popped, "worker-1").await.unwrap();
    assert!(claimed.is_some());
    assert_eq!(claimed.unwrap().status, JobStatus::Scheduled);

    // A second claim attempt on the same id (simulating a racing worker
    // that also had it queued) must lose.
    assert!(jobs.claim_optimistic(popped, "worker-2").await.unwrap().is_none());
}

/// S4: a job with an unmet dependency is not ready; once the dependency
/// succeeds, it becomes ready, and a failed dependency blocks it instead.
#[tokio::test]
async fn dag_gating_blocks_until_dependency_resolves() {
    let jobs = Arc::new(InMemoryJobStore::new());
    let parent = jobs.insert_job(JobFactory::new().idempotency_key("parent").build()).await.unwrap();
    let child = jobs
        .insert_job(JobFactory::new().idempotency_key("child").depends_on(parent.job_id).build())
        .await
        .unwrap();

    // Parent still pending: child is neither ready nor blocked.
    let ready = jobs.ready_jobs(10).await.unwrap();
    assert!(!ready.iter().any(|j| j.job_id == child.job_id));
    assert!(jobs.blocked_jobs().await.unwrap().is_empty());

    // Parent claimed, run, and succeeds: child becomes ready.
    jobs.claim_batch("worker-1", 10).await.unwrap();
    jobs.mark_running(parent.job_id).await.unwrap();
    jobs.mark_success(parent.job_id, json!({})).await.unwrap();
    let ready = jobs.ready_jobs(10).await.unwrap();
    assert!(ready.iter().any(|j| j.job_id == child.job_id));
}

#[tokio::test]
async fn dag_gating_blocks_permanently_on_failed_dependency() {
    let jobs = Arc::new(InMemoryJobStore::new());
    let parent = jobs.insert_job(JobFactory::new().idempotency_key("parent2").max_retries(0).build()).await.unwrap();
    let child = jobs
        .insert_job(JobFactory::new().idempotency_key("child2").depends_on(parent.job_id).build())
        .await
        .unwrap();

    jobs.claim_batch("worker-1", 10).await.unwrap();
    jobs.mark_running(parent.job_id).await.unwrap();
    jobs.mark_failed(parent.job_id, "boom", json!({"kind": "handler_failure"})).await.unwrap();
    jobs.mark_dead(parent.job_id).await.unwrap();

    let blocked = jobs.blocked_jobs().await.unwrap();
    assert!(blocked.iter().any(|j| j.job_id == child.job_id));
}

/// S5: a handler that never returns hits the per-job timeout, which fails
/// the job and routes it through the retry layer for a scheduled retry.
#[tokio::test]
async fn handler_timeout_then_retry() {
    let jobs = Arc::new(InMemoryJobStore::new());
    let job = jobs
        .insert_job(JobFactory::new().job_type("slow").timeout_seconds(1).max_retries(2).build())
        .await
        .unwrap();

    let registry = HandlerRegistry::new();
    registry
        .register(
            "slow",
            Arc::new(FnHandler(|_: serde_json::Value| async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(json!({}))
            })),
        )
        .unwrap();

    let claimed = jobs.claim_batch("worker-1", 10).await.unwrap().remove(0);
    let executor = JobExecutor::new(jobs.clone(), Arc::new(registry));
    let failed = executor.execute(claimed).await.unwrap();

    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error_details.as_ref().unwrap().kind, "timeout");

    let retry_layer = RetryLayer::new(jobs.clone(), Duration::from_secs(1), Duration::from_secs(60));
    let retried = retry_layer.handle_failure(&failed).await.unwrap();

    assert_eq!(retried.status, JobStatus::Scheduled);
    assert_eq!(retried.retry_count, 1);
    assert!(retried.scheduled_at > job.scheduled_at);
}

/// S6: a worker whose heartbeat marker expires is swept as stale, and its
/// in-flight job is reclaimed back to `PENDING` for another worker to pick
/// up; a job it already finished is left alone.
#[tokio::test]
async fn stale_worker_reclaim() {
    let job_store = Arc::new(InMemoryJobStore::new());
    let worker_store = Arc::new(InMemoryWorkerStore::new());
    let marker = Arc::new(InMemoryHeartbeatMarker::new());
    let assignments = Arc::new(InMemoryAssignmentTracker::new());

    let heartbeat = HeartbeatService::new(worker_store.clone(), marker.clone(), assignments.clone(), Duration::from_millis(20));
    let worker = heartbeat
        .register(NewWorker {
            worker_id: "worker-stale".to_string(),
            hostname: "h".to_string(),
            pid: 1,
            max_concurrent_jobs: 2,
            version: "0.1.0".to_string(),
            capabilities: None,
            metadata: None,
        })
        .await
        .unwrap();

    let running = job_store.insert_job(JobFactory::new().idempotency_key("in-flight").build()).await.unwrap();
    job_store.claim_batch(&worker.worker_id, 10).await.unwrap();
    job_store.mark_running(running.job_id).await.unwrap();
    assignments.assign(&worker.worker_id, running.job_id).await.unwrap();

    let finished = job_store.insert_job(JobFactory::new().idempotency_key("already-done").build()).await.unwrap();
    job_store.claim_batch(&worker.worker_id, 10).await.unwrap();
    job_store.mark_running(finished.job_id).await.unwrap();
    job_store.mark_success(finished.job_id, json!({})).await.unwrap();
    assignments.assign(&worker.worker_id, finished.job_id).await.unwrap();

    // Let the marker expire.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!heartbeat.marker_is_alive(&worker.worker_id).await.unwrap());

    let reclaimed = heartbeat.handle_stale_worker(&worker.worker_id, job_store.as_ref()).await.unwrap();
    assert_eq!(reclaimed, 1);

    let reclaimed_job = job_store.get_job(running.job_id).await.unwrap();
    assert_eq!(reclaimed_job.status, JobStatus::Pending);

    let untouched = job_store.get_job(finished.job_id).await.unwrap();
    assert_eq!(untouched.status, JobStatus::Success);

    assert!(assignments.assignments(&worker.worker_id).await.unwrap().is_empty());
}

/// A workflow's aggregated status reflects its attached jobs end to end.
#[tokio::test]
async fn workflow_aggregation_reflects_job_outcomes() {
    let job_store = Arc::new(InMemoryJobStore::new());
    let workflow_store = Arc::new(InMemoryWorkflowStore::new(job_store.clone()));

    let workflow = workflow_store.create_workflow(WorkflowFactory::new().name("nightly-batch").build()).await.unwrap();

    let a = job_store.insert_job(JobFactory::new().idempotency_key("a").build()).await.unwrap();
    let b = job_store.insert_job(JobFactory::new().idempotency_key("b").build()).await.unwrap();
    workflow_store.attach_job(workflow.workflow_id, a.job_id).await.unwrap();
    workflow_store.attach_job(workflow.workflow_id, b.job_id).await.unwrap();

    let aggregator = crate::aggregator::WorkflowAggregator::new(workflow_store.clone(), job_store.clone());
    let status = aggregator.status(workflow.workflow_id).await.unwrap();
    assert_eq!(status.overall, WorkflowOverallStatus::Pending);

    job_store.claim_batch("worker-1", 10).await.unwrap();
    job_store.mark_running(a.job_id).await.unwrap();
    job_store.mark_success(a.job_id, json!({})).await.unwrap();

    let status = aggregator.status(workflow.workflow_id).await.unwrap();
    assert_eq!(status.overall, WorkflowOverallStatus::Running);

    job_store.mark_running(b.job_id).await.unwrap();
    job_store.mark_success(b.job_id, json!({})).await.unwrap();

    let status = aggregator.status(workflow.workflow_id).await.unwrap();
    assert_eq!(status.overall, WorkflowOverallStatus::Completed);
}
