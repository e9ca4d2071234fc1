use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A worker node as recorded in the node registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    pub group: String,
    pub join_time: DateTime<Utc>,
    /// Inactive nodes are being drained: they keep their running jobs but
    /// receive no new ones.
    pub active: bool,
    /// Opaque ordered version tag, compared lexicographically.
    pub version: String,
}

impl NodeInfo {
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.join_time
    }
}

/// Outcome of a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobResult {
    Success,
    Failure,
}

impl std::fmt::Display for JobResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobResult::Success => write!(f, "success"),
            JobResult::Failure => write!(f, "failure"),
        }
    }
}

/// When a scheduled job fires and how stale a firing may be.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSchedule {
    /// Cron expression, 5-field or 6-field with seconds.
    pub cron: String,
    /// Maximum age of a firing that may still be queued. Older firings
    /// are skipped.
    pub max_job_age: std::time::Duration,
}

/// A declared job in the schedule. Declarations are eternal; each firing
/// produces a queued instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub job_id: String,
    /// Serialization key: at most one queued or running instance per lock.
    pub lock: String,
    pub job_type: String,
    /// Load score, summed per node against the node weight limit.
    pub weight: u32,
    pub data: HashMap<String, serde_json::Value>,
    pub schedule: JobSchedule,
    pub max_attempts: u32,
    /// Lower value means higher priority.
    pub priority: i32,
    /// Minimum node version this job may run on. `None` accepts any node.
    pub min_version: Option<String>,
}

impl ScheduledJob {
    /// Derive a queued instance for a firing observed at `queued_time`.
    pub fn to_queued_job(&self, queued_time: DateTime<Utc>) -> QueuedJob {
        QueuedJob {
            instance_id: Uuid::new_v4(),
            job_id: self.job_id.clone(),
            lock: self.lock.clone(),
            job_type: self.job_type.clone(),
            weight: self.weight,
            data: self.data.clone(),
            max_attempts: self.max_attempts,
            priority: self.priority,
            min_version: self.min_version.clone(),
            queued_time,
            attempts: 0,
        }
    }
}

/// A job instance waiting for placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub instance_id: Uuid,
    pub job_id: String,
    pub lock: String,
    pub job_type: String,
    pub weight: u32,
    pub data: HashMap<String, serde_json::Value>,
    pub max_attempts: u32,
    pub priority: i32,
    pub min_version: Option<String>,
    pub queued_time: DateTime<Utc>,
    pub attempts: u32,
}

impl QueuedJob {
    /// Transition to running on `node_id`, bumping the attempt counter.
    pub fn start_on(&self, node_id: &str, start_time: DateTime<Utc>) -> RunningJob {
        let mut job = self.clone();
        job.attempts += 1;
        RunningJob {
            job,
            assigned_node_id: node_id.to_string(),
            start_time,
        }
    }
}

/// A placed job instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningJob {
    pub job: QueuedJob,
    pub assigned_node_id: String,
    pub start_time: DateTime<Utc>,
}

impl RunningJob {
    pub fn lock(&self) -> &str {
        &self.job.lock
    }

    /// Return to the queue, retaining the attempt count.
    pub fn requeue(&self) -> QueuedJob {
        self.job.clone()
    }

    /// Terminalize with a result.
    pub fn finish(
        &self,
        result: JobResult,
        message: Option<String>,
        finish_time: DateTime<Utc>,
    ) -> FinishedJob {
        FinishedJob {
            job: self.job.clone(),
            assigned_node_id: self.assigned_node_id.clone(),
            start_time: self.start_time,
            finish_time,
            result,
            message,
        }
    }
}

/// A terminalized job instance, kept as history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishedJob {
    pub job: QueuedJob,
    pub assigned_node_id: String,
    pub start_time: DateTime<Utc>,
    pub finish_time: DateTime<Utc>,
    pub result: JobResult,
    pub message: Option<String>,
}
