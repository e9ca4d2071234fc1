use std::sync::Arc;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::NodeConfig;
use crate::error::{DroverError, Result};
use crate::leader::LeaderDuties;
use crate::store::{CloudManager, JobStore, NodeRegistry, ScheduleSource};

/// One cluster member: drives the periodic duties for its group until
/// cancelled.
pub struct Node {
    pub config: NodeConfig,
    pub duties: Arc<LeaderDuties>,
}

impl Node {
    pub fn new(
        config: NodeConfig,
        registry: Arc<dyn NodeRegistry>,
        job_store: Arc<dyn JobStore>,
        schedule_source: Arc<dyn ScheduleSource>,
        cloud: Arc<dyn CloudManager>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let duties = Arc::new(LeaderDuties::new(
            config.identity.clone(),
            config.leader.clone(),
            config.scale.clone(),
            registry,
            job_store,
            schedule_source,
            cloud,
            clock,
        ));
        Ok(Self { config, duties })
    }

    /// Run all duties until the token is cancelled.
    ///
    /// Duties run serially on this task; the first election tick fires
    /// immediately so a restarted node rejoins quickly. A failed tick is
    /// logged and the duty retried at its next interval, except for an
    /// invariant violation, which stops the runner; the node needs a
    /// restart and re-election to recover.
    pub async fn run(&self, shutdown: CancellationToken) {
        let intervals = &self.config.intervals;
        let mut election = interval(intervals.election);
        let mut refresh = interval(intervals.schedule_refresh);
        let mut queue = interval(intervals.queue);
        let mut assign = interval(intervals.assign);
        let mut recover = interval(intervals.recover);
        let mut scale = interval(intervals.scale);
        let mut reap = interval(intervals.reap);

        tracing::info!(
            node_id = %self.config.identity.node_id,
            group = %self.config.identity.group,
            "Starting duty runner"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(node_id = %self.config.identity.node_id, "Duty runner shutting down");
                    break;
                }
                _ = election.tick() => {
                    if !self.handle("elect_cluster_leader", self.duties.elect_cluster_leader().await) {
                        break;
                    }
                }
                _ = refresh.tick() => {
                    if !self.handle("refresh_jobs_schedule", self.duties.refresh_jobs_schedule(false).await) {
                        break;
                    }
                }
                _ = queue.tick() => {
                    if !self.handle("queue_scheduled_jobs", self.duties.queue_scheduled_jobs().await) {
                        break;
                    }
                }
                _ = assign.tick() => {
                    if !self.handle("assign_queued_jobs", self.duties.assign_queued_jobs().await) {
                        break;
                    }
                }
                _ = recover.tick() => {
                    if !self.handle("clean_dead_nodes_jobs", self.duties.clean_dead_nodes_jobs().await) {
                        break;
                    }
                }
                _ = scale.tick() => {
                    if !self.handle("scale_cluster", self.duties.scale_cluster().await) {
                        break;
                    }
                }
                _ = reap.tick() => {
                    if !self.handle("clean_inactive_nodes", self.duties.clean_inactive_nodes().await) {
                        break;
                    }
                }
            }
        }
    }

    /// Returns false when the runner must stop.
    fn handle(&self, duty: &str, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e @ DroverError::InvariantViolation(_)) => {
                tracing::error!(
                    node_id = %self.config.identity.node_id,
                    duty,
                    error = %e,
                    "Invariant violated, stopping duty runner"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    node_id = %self.config.identity.node_id,
                    duty,
                    error = %e,
                    "Duty failed, retrying on next tick"
                );
                true
            }
        }
    }
}
