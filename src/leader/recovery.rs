use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use super::state::LeaderState;
use crate::clock::Clock;
use crate::config::NodeIdentity;
use crate::error::Result;
use crate::job::JobResult;
use crate::store::{JobStore, NodeRegistry};

/// Detects jobs running on absent or inactive nodes and requeues or
/// finalizes them.
pub struct DeadNodeRecoverer {
    identity: NodeIdentity,
    registry: Arc<dyn NodeRegistry>,
    job_store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    state: Arc<LeaderState>,
}

impl DeadNodeRecoverer {
    pub fn new(
        identity: NodeIdentity,
        registry: Arc<dyn NodeRegistry>,
        job_store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
        state: Arc<LeaderState>,
    ) -> Self {
        Self {
            identity,
            registry,
            job_store,
            clock,
            state,
        }
    }

    /// Requeue or finalize every running job whose node has left the
    /// registry or gone inactive. A single registry snapshot covers the
    /// whole pass; the running set is re-read from the store.
    pub async fn clean_dead_nodes_jobs(&self) -> Result<()> {
        if !self.state.is_leader().await {
            return Ok(());
        }
        let now = self.clock.now();

        let alive: HashSet<String> = self
            .registry
            .get_all_nodes()
            .await?
            .into_iter()
            .filter(|n| n.group == self.identity.group && n.active)
            .map(|n| n.node_id)
            .collect();

        for running in self.job_store.get_running_jobs().await? {
            if alive.contains(&running.assigned_node_id) {
                continue;
            }

            if running.job.attempts < running.job.max_attempts {
                let queued = self.job_store.move_running_to_queued(&running).await?;
                warn!(
                    job_id = %running.job.job_id,
                    node_id = %running.assigned_node_id,
                    attempts = queued.attempts,
                    "Assigned node is gone, requeued job"
                );
                self.state.mark_requeued(queued).await;
            } else {
                let message = format!(
                    "{} is dead and max attempts has been reached",
                    running.assigned_node_id
                );
                self.job_store
                    .move_running_to_finished(&running, JobResult::Failure, Some(message), now)
                    .await?;
                warn!(
                    job_id = %running.job.job_id,
                    node_id = %running.assigned_node_id,
                    attempts = running.job.attempts,
                    "Assigned node is gone and attempts are exhausted, failing job"
                );
                self.state.remove_running(running.lock()).await;
            }
        }
        Ok(())
    }
}
