//! In-memory store implementations. They back the integration harness
//! and the embedded demo mode; a production deployment plugs a durable
//! backend into the same traits.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{CloudManager, JobStore, NodeRegistry, ScheduleSource};
use crate::error::{DroverError, Result};
use crate::job::{FinishedJob, JobResult, NodeInfo, QueuedJob, RunningJob, ScheduledJob};

/// In-memory node registry.
#[derive(Debug, Default)]
pub struct MemoryNodeRegistry {
    nodes: RwLock<HashMap<String, NodeInfo>>,
}

impl MemoryNodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, node: NodeInfo) {
        self.nodes.write().await.insert(node.node_id.clone(), node);
    }

    /// Remove a node outright, as a crashed machine would disappear.
    pub async fn remove(&self, node_id: &str) -> bool {
        self.nodes.write().await.remove(node_id).is_some()
    }
}

#[async_trait]
impl NodeRegistry for MemoryNodeRegistry {
    async fn get_all_nodes(&self) -> Result<Vec<NodeInfo>> {
        Ok(self.nodes.read().await.values().cloned().collect())
    }

    async fn get_youngest_active_nodes_by_group(
        &self,
        group: &str,
        count: usize,
    ) -> Result<Vec<NodeInfo>> {
        let nodes = self.nodes.read().await;
        let mut matching: Vec<NodeInfo> = nodes
            .values()
            .filter(|n| n.group == group && n.active)
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.join_time
                .cmp(&a.join_time)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
        matching.truncate(count);
        Ok(matching)
    }

    async fn get_all_active_nodes_count_by_group(&self, group: &str) -> Result<usize> {
        let nodes = self.nodes.read().await;
        Ok(nodes
            .values()
            .filter(|n| n.group == group && n.active)
            .count())
    }

    async fn get_all_inactive_nodes_by_group(&self, group: &str) -> Result<Vec<NodeInfo>> {
        let nodes = self.nodes.read().await;
        Ok(nodes
            .values()
            .filter(|n| n.group == group && !n.active)
            .cloned()
            .collect())
    }

    async fn update_node_status(&self, node_id: &str, active: bool) -> Result<()> {
        let mut nodes = self.nodes.write().await;
        match nodes.get_mut(node_id) {
            Some(node) => {
                node.active = active;
                Ok(())
            }
            None => Err(DroverError::NodeNotFound(node_id.to_string())),
        }
    }
}

#[derive(Debug, Default)]
struct JobStoreInner {
    queued: HashMap<String, QueuedJob>,
    running: HashMap<String, RunningJob>,
    finished: Vec<FinishedJob>,
}

/// In-memory job store. One lock over all three collections keeps every
/// move operation atomic.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    inner: RwLock<JobStoreInner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finished-job archive, in finish order.
    pub async fn get_finished_jobs(&self) -> Vec<FinishedJob> {
        self.inner.read().await.finished.clone()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get_queued_jobs(&self) -> Result<Vec<QueuedJob>> {
        Ok(self.inner.read().await.queued.values().cloned().collect())
    }

    async fn get_running_jobs(&self) -> Result<Vec<RunningJob>> {
        Ok(self.inner.read().await.running.values().cloned().collect())
    }

    async fn create_queued_job(&self, job: &QueuedJob) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.queued.contains_key(&job.lock) || inner.running.contains_key(&job.lock) {
            return Err(DroverError::DuplicateLock(job.lock.clone()));
        }
        inner.queued.insert(job.lock.clone(), job.clone());
        Ok(())
    }

    async fn move_queued_to_running(
        &self,
        queued: &QueuedJob,
        node_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RunningJob> {
        let mut inner = self.inner.write().await;
        let job = inner
            .queued
            .remove(&queued.lock)
            .ok_or_else(|| DroverError::JobNotFound(queued.lock.clone()))?;
        let running = job.start_on(node_id, now);
        inner.running.insert(running.lock().to_string(), running.clone());
        Ok(running)
    }

    async fn move_running_to_queued(&self, running: &RunningJob) -> Result<QueuedJob> {
        let mut inner = self.inner.write().await;
        let job = inner
            .running
            .remove(running.lock())
            .ok_or_else(|| DroverError::JobNotFound(running.lock().to_string()))?;
        let queued = job.requeue();
        inner.queued.insert(queued.lock.clone(), queued.clone());
        Ok(queued)
    }

    async fn move_running_to_finished(
        &self,
        running: &RunningJob,
        result: JobResult,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<FinishedJob> {
        let mut inner = self.inner.write().await;
        let job = inner
            .running
            .remove(running.lock())
            .ok_or_else(|| DroverError::JobNotFound(running.lock().to_string()))?;
        let finished = job.finish(result, message, now);
        inner.finished.push(finished.clone());
        Ok(finished)
    }
}

/// In-memory schedule source with a replaceable job list.
#[derive(Debug, Default)]
pub struct MemoryScheduleSource {
    jobs: RwLock<Vec<ScheduledJob>>,
}

impl MemoryScheduleSource {
    pub fn new(jobs: Vec<ScheduledJob>) -> Self {
        Self {
            jobs: RwLock::new(jobs),
        }
    }

    pub async fn replace(&self, jobs: Vec<ScheduledJob>) {
        *self.jobs.write().await = jobs;
    }
}

#[async_trait]
impl ScheduleSource for MemoryScheduleSource {
    async fn get_jobs_schedule(&self) -> Result<Vec<ScheduledJob>> {
        Ok(self.jobs.read().await.clone())
    }
}

/// Every cloud request the controller has made.
#[derive(Debug, Default, Clone)]
pub struct CloudActivity {
    pub scale_up_requests: Vec<usize>,
    pub scale_down_requests: Vec<HashSet<String>>,
}

/// Cloud manager that records requests instead of provisioning. An
/// injected outage makes every call fail, for exercising the controller's
/// retry behavior.
#[derive(Debug, Default)]
pub struct RecordingCloudManager {
    activity: RwLock<CloudActivity>,
    unavailable: AtomicBool,
}

impl RecordingCloudManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn activity(&self) -> CloudActivity {
        self.activity.read().await.clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DroverError::CloudUnavailable("injected outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CloudManager for RecordingCloudManager {
    async fn scale_up(&self, count: usize) -> Result<()> {
        self.check_available()?;
        self.activity.write().await.scale_up_requests.push(count);
        Ok(())
    }

    async fn scale_down(&self, node_ids: HashSet<String>) -> Result<()> {
        self.check_available()?;
        self.activity.write().await.scale_down_requests.push(node_ids);
        Ok(())
    }
}
