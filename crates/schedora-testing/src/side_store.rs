//! In-memory doubles for the side-store traits (`PriorityQueue`,
//! `HeartbeatMarker`, `AssignmentTracker`), mirroring
//! `schedora-queue`'s Redis-backed implementations minus the network.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use schedora_core::error::Result;
use schedora_core::heartbeat::{AssignmentTracker, HeartbeatMarker};
use schedora_core::queue::{DlqEntry, PriorityQueue};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryPriorityQueue {
    entries: Mutex<Vec<(Uuid, i16)>>,
    dlq: DashMap<Uuid, DlqEntry>,
}

impl InMemoryPriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PriorityQueue for InMemoryPriorityQueue {
    async fn enqueue(&self, job_id: Uuid, priority: i16) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|(id, _)| *id != job_id);
        entries.push((job_id, priority));
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<Uuid>> {
        let mut entries = self.entries.lock().unwrap();
        let Some((idx, _)) = entries
            .iter()
            .enumerate()
            .max_by_key(|(_, (_, priority))| *priority)
        else {
            return Ok(None);
        };
        Ok(Some(entries.remove(idx).0))
    }

    async fn peek(&self) -> Result<Option<Uuid>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.iter().max_by_key(|(_, priority)| *priority).map(|(id, _)| *id))
    }

    async fn remove(&self, job_id: Uuid) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|(id, _)| *id != job_id);
        Ok(entries.len() != before)
    }

    async fn length(&self) -> Result<u64> {
        Ok(self.entries.lock().unwrap().len() as u64)
    }

    async fn dlq_length(&self) -> Result<u64> {
        Ok(self.dlq.len() as u64)
    }

    async fn purge(&self) -> Result<()> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }

    async fn purge_dlq(&self) -> Result<()> {
        self.dlq.clear();
        Ok(())
    }

    async fn move_to_dlq(&self, job_id: Uuid, reason: &str, retry_count: i32) -> Result<()> {
        self.entries.lock().unwrap().retain(|(id, _)| *id != job_id);
        self.dlq.insert(
            job_id,
            DlqEntry {
                job_id,
                reason: reason.to_string(),
                retry_count,
                moved_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn dlq_entries(&self) -> Result<Vec<DlqEntry>> {
        Ok(self.dlq.iter().map(|e| e.clone()).collect())
    }
}

/// A marker entry with an explicit expiry instant rather than a real TTL
/// store, since there's no background eviction here — `is_alive` checks
/// the deadline at read time instead.
#[derive(Default)]
pub struct InMemoryHeartbeatMarker {
    deadlines: DashMap<String, Instant>,
}

impl InMemoryHeartbeatMarker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HeartbeatMarker for InMemoryHeartbeatMarker {
    async fn install(&self, worker_id: &str, ttl: Duration) -> Result<()> {
        self.deadlines.insert(worker_id.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn refresh(&self, worker_id: &str, ttl: Duration) -> Result<()> {
        self.install(worker_id, ttl).await
    }

    async fn is_alive(&self, worker_id: &str) -> Result<bool> {
        Ok(self.deadlines.get(worker_id).map_or(false, |d| *d > Instant::now()))
    }

    async fn remove(&self, worker_id: &str) -> Result<()> {
        self.deadlines.remove(worker_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAssignmentTracker {
    assignments: DashMap<String, Vec<Uuid>>,
}

impl InMemoryAssignmentTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssignmentTracker for InMemoryAssignmentTracker {
    async fn assign(&self, worker_id: &str, job_id: Uuid) -> Result<()> {
        let mut entry = self.assignments.entry(worker_id.to_string()).or_default();
        if !entry.contains(&job_id) {
            entry.push(job_id);
        }
        Ok(())
    }

    async fn unassign(&self, worker_id: &str, job_id: Uuid) -> Result<()> {
        if let Some(mut entry) = self.assignments.get_mut(worker_id) {
            entry.retain(|id| *id != job_id);
        }
        Ok(())
    }

    async fn assignments(&self, worker_id: &str) -> Result<Vec<Uuid>> {
        Ok(self.assignments.get(worker_id).map(|v| v.clone()).unwrap_or_default())
    }

    async fn clear(&self, worker_id: &str) -> Result<()> {
        self.assignments.remove(worker_id);
        Ok(())
    }
}
