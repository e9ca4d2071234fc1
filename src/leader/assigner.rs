use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::state::LeaderState;
use crate::clock::Clock;
use crate::config::{LeaderConfig, NodeIdentity};
use crate::error::Result;
use crate::job::{NodeInfo, QueuedJob};
use crate::store::{JobStore, NodeRegistry};

/// Matches queued jobs to active nodes under weight, version, and
/// priority constraints.
pub struct JobAssigner {
    identity: NodeIdentity,
    config: LeaderConfig,
    registry: Arc<dyn NodeRegistry>,
    job_store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    state: Arc<LeaderState>,
}

impl JobAssigner {
    pub fn new(
        identity: NodeIdentity,
        config: LeaderConfig,
        registry: Arc<dyn NodeRegistry>,
        job_store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
        state: Arc<LeaderState>,
    ) -> Self {
        Self {
            identity,
            config,
            registry,
            job_store,
            clock,
            state,
        }
    }

    /// Place queued jobs on active nodes, highest priority first.
    ///
    /// Queued and running sets are re-read from the store. A job lands on
    /// the eligible node with the most remaining weight capacity,
    /// counting placements made earlier in the same pass. Jobs with no
    /// eligible node stay queued; partial passes are fine.
    pub async fn assign_queued_jobs(&self) -> Result<()> {
        if !self.state.is_leader().await {
            return Ok(());
        }
        let now = self.clock.now();

        let nodes: Vec<NodeInfo> = self
            .registry
            .get_all_nodes()
            .await?
            .into_iter()
            .filter(|n| n.group == self.identity.group && n.active)
            .collect();
        if nodes.len() < self.config.min_active_nodes {
            debug!(
                active = nodes.len(),
                needed = self.config.min_active_nodes,
                "Not enough active nodes, holding back placement"
            );
            return Ok(());
        }

        let mut queued = self.job_store.get_queued_jobs().await?;
        queued.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });

        // Remaining weight capacity per node, updated as this pass places
        // jobs so a single pass cannot overcommit a node.
        let mut capacity: HashMap<String, i64> = nodes
            .iter()
            .map(|n| (n.node_id.clone(), i64::from(self.config.max_weight_per_node)))
            .collect();
        for running in self.job_store.get_running_jobs().await? {
            if let Some(cap) = capacity.get_mut(&running.assigned_node_id) {
                *cap -= i64::from(running.job.weight);
            }
        }

        let excluded = if self.config.leader_also_worker {
            None
        } else {
            Some(self.identity.node_id.as_str())
        };

        for job in queued {
            let Some(node_id) = pick_node(&nodes, &capacity, &job, excluded) else {
                debug!(
                    job_id = %job.job_id,
                    weight = job.weight,
                    "No eligible node, leaving job queued"
                );
                continue;
            };

            let running = self
                .job_store
                .move_queued_to_running(&job, &node_id, now)
                .await?;
            if let Some(cap) = capacity.get_mut(&node_id) {
                *cap -= i64::from(job.weight);
            }
            info!(
                job_id = %job.job_id,
                lock = %job.lock,
                node_id = %node_id,
                attempts = running.job.attempts,
                "Assigned job"
            );
            self.state.mark_running(running).await;
        }
        Ok(())
    }
}

/// The eligible node with the greatest remaining capacity, node id as the
/// tie-break. Eligibility: active (callers pre-filter), enough capacity
/// for the job's weight, a satisfying version, and not the excluded node.
fn pick_node(
    nodes: &[NodeInfo],
    capacity: &HashMap<String, i64>,
    job: &QueuedJob,
    excluded: Option<&str>,
) -> Option<String> {
    nodes
        .iter()
        .filter(|n| excluded != Some(n.node_id.as_str()))
        .filter(|n| version_satisfies(n, job))
        .filter_map(|n| capacity.get(&n.node_id).map(|cap| (n, *cap)))
        .filter(|(_, cap)| *cap >= i64::from(job.weight))
        .max_by(|(a, cap_a), (b, cap_b)| {
            cap_a
                .cmp(cap_b)
                .then_with(|| b.node_id.cmp(&a.node_id))
        })
        .map(|(n, _)| n.node_id.clone())
}

fn version_satisfies(node: &NodeInfo, job: &QueuedJob) -> bool {
    match &job.min_version {
        Some(min) => node.version.as_str() >= min.as_str(),
        None => true,
    }
}
