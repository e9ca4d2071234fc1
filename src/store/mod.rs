//! Contracts for the external collaborators: the durable node registry
//! and job store, the declared schedule, and the cloud provider SPI.
//!
//! The stores are authoritative; everything the leader caches in memory
//! is rebuilt from them. Move operations on the job store are atomic:
//! a job leaves one state and enters the other as a single step, or the
//! call fails with no change.

pub mod memory;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::job::{FinishedJob, JobResult, NodeInfo, QueuedJob, RunningJob, ScheduledJob};

/// Durable record of every node in the cluster.
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    async fn get_all_nodes(&self) -> Result<Vec<NodeInfo>>;

    /// The `count` youngest active nodes in `group`, youngest first.
    async fn get_youngest_active_nodes_by_group(
        &self,
        group: &str,
        count: usize,
    ) -> Result<Vec<NodeInfo>>;

    async fn get_all_active_nodes_count_by_group(&self, group: &str) -> Result<usize>;

    async fn get_all_inactive_nodes_by_group(&self, group: &str) -> Result<Vec<NodeInfo>>;

    async fn update_node_status(&self, node_id: &str, active: bool) -> Result<()>;
}

/// Durable record of queued, running, and finished jobs, keyed by lock
/// across queued and running.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_queued_jobs(&self) -> Result<Vec<QueuedJob>>;

    async fn get_running_jobs(&self) -> Result<Vec<RunningJob>>;

    /// Persist a fresh queued instance. Fails if the lock is already
    /// queued or running, which bounds the damage of two concurrent
    /// leaders racing on the same firing.
    async fn create_queued_job(&self, job: &QueuedJob) -> Result<()>;

    async fn move_queued_to_running(
        &self,
        queued: &QueuedJob,
        node_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RunningJob>;

    async fn move_running_to_queued(&self, running: &RunningJob) -> Result<QueuedJob>;

    async fn move_running_to_finished(
        &self,
        running: &RunningJob,
        result: JobResult,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<FinishedJob>;
}

/// Lazy sequence of declared scheduled jobs.
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn get_jobs_schedule(&self) -> Result<Vec<ScheduledJob>>;
}

/// Side-effecting cloud provider SPI. Calls are fire-and-forget; the
/// scale controller guards re-entry with its own timers.
#[async_trait]
pub trait CloudManager: Send + Sync {
    async fn scale_up(&self, count: usize) -> Result<()>;

    async fn scale_down(&self, node_ids: HashSet<String>) -> Result<()>;
}
