use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::job::{QueuedJob, RunningJob, ScheduledJob};

#[derive(Debug, Default)]
struct Mirror {
    is_leader: bool,
    schedule: Vec<ScheduledJob>,
    queued: HashMap<String, QueuedJob>,
    running: HashMap<String, RunningJob>,
}

/// Per-node cache of the cluster state the leader duties read and write:
/// the declared schedule, the queued and running jobs, and whether this
/// node currently holds group leadership.
///
/// The store stays authoritative. On any divergence the next leadership
/// transition or schedule refresh rebuilds the mirror from the store. A
/// single lock guards the whole mirror, so leadership transitions (flag
/// plus contents) are observable as one step.
#[derive(Debug, Default)]
pub struct LeaderState {
    mirror: RwLock<Mirror>,
}

impl LeaderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_leader(&self) -> bool {
        self.mirror.read().await.is_leader
    }

    /// Take leadership with a freshly loaded mirror, as one step.
    pub async fn assume_leadership(
        &self,
        schedule: Vec<ScheduledJob>,
        queued: Vec<QueuedJob>,
        running: Vec<RunningJob>,
    ) {
        let mut mirror = self.mirror.write().await;
        mirror.is_leader = true;
        mirror.schedule = schedule;
        mirror.queued = queued.into_iter().map(|j| (j.lock.clone(), j)).collect();
        mirror.running = running
            .into_iter()
            .map(|j| (j.lock().to_string(), j))
            .collect();
    }

    /// Drop leadership and clear the mirror, as one step.
    pub async fn resign_leadership(&self) {
        let mut mirror = self.mirror.write().await;
        mirror.is_leader = false;
        mirror.schedule.clear();
        mirror.queued.clear();
        mirror.running.clear();
    }

    pub async fn replace_schedule(&self, schedule: Vec<ScheduledJob>) {
        self.mirror.write().await.schedule = schedule;
    }

    pub async fn schedule(&self) -> Vec<ScheduledJob> {
        self.mirror.read().await.schedule.clone()
    }

    pub async fn queued_jobs(&self) -> Vec<QueuedJob> {
        self.mirror.read().await.queued.values().cloned().collect()
    }

    pub async fn running_jobs(&self) -> Vec<RunningJob> {
        self.mirror.read().await.running.values().cloned().collect()
    }

    /// True when the lock has a live (queued or running) instance.
    pub async fn holds_lock(&self, lock: &str) -> bool {
        let mirror = self.mirror.read().await;
        mirror.queued.contains_key(lock) || mirror.running.contains_key(lock)
    }

    pub async fn insert_queued(&self, job: QueuedJob) {
        self.mirror
            .write()
            .await
            .queued
            .insert(job.lock.clone(), job);
    }

    /// Reflect a queued-to-running move.
    pub async fn mark_running(&self, running: RunningJob) {
        let mut mirror = self.mirror.write().await;
        mirror.queued.remove(running.lock());
        mirror.running.insert(running.lock().to_string(), running);
    }

    /// Reflect a running-to-queued move.
    pub async fn mark_requeued(&self, queued: QueuedJob) {
        let mut mirror = self.mirror.write().await;
        mirror.running.remove(&queued.lock);
        mirror.queued.insert(queued.lock.clone(), queued);
    }

    /// Reflect a running-to-finished move.
    pub async fn remove_running(&self, lock: &str) {
        self.mirror.write().await.running.remove(lock);
    }
}
