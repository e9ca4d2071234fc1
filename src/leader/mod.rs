//! Leader duties: election, schedule refresh, job queueing, placement,
//! dead-node recovery, and autoscaling.
//!
//! Every node carries the full set of duties; the ones that mutate
//! cluster job state consult the leader flag first and no-op on
//! followers. Duties on one node run serially, so a single task per
//! node drives all of them.

pub mod assigner;
pub mod elector;
pub mod queuer;
pub mod recovery;
pub mod refresher;
pub mod scale;
pub mod state;

pub use assigner::JobAssigner;
pub use elector::LeaderElector;
pub use queuer::JobQueuer;
pub use recovery::DeadNodeRecoverer;
pub use refresher::ScheduleRefresher;
pub use scale::ScaleController;
pub use state::LeaderState;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::clock::Clock;
use crate::config::{LeaderConfig, NodeIdentity, ScaleConfig};
use crate::error::Result;
use crate::store::{CloudManager, JobStore, NodeRegistry, ScheduleSource};

/// All duties of one cluster node, wired over the shared stores.
pub struct LeaderDuties {
    pub state: Arc<LeaderState>,
    pub elector: LeaderElector,
    pub refresher: ScheduleRefresher,
    pub queuer: JobQueuer,
    pub assigner: JobAssigner,
    pub recoverer: DeadNodeRecoverer,
    pub scaler: ScaleController,
    identity: NodeIdentity,
    leader_config: LeaderConfig,
    registry: Arc<dyn NodeRegistry>,
    job_store: Arc<dyn JobStore>,
}

impl LeaderDuties {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: NodeIdentity,
        leader_config: LeaderConfig,
        scale_config: ScaleConfig,
        registry: Arc<dyn NodeRegistry>,
        job_store: Arc<dyn JobStore>,
        schedule_source: Arc<dyn ScheduleSource>,
        cloud: Arc<dyn CloudManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = Arc::new(LeaderState::new());
        Self {
            elector: LeaderElector::new(
                identity.clone(),
                leader_config.clone(),
                registry.clone(),
                job_store.clone(),
                schedule_source.clone(),
                clock.clone(),
                state.clone(),
            ),
            refresher: ScheduleRefresher::new(schedule_source, state.clone()),
            queuer: JobQueuer::new(job_store.clone(), clock.clone(), state.clone()),
            assigner: JobAssigner::new(
                identity.clone(),
                leader_config.clone(),
                registry.clone(),
                job_store.clone(),
                clock.clone(),
                state.clone(),
            ),
            recoverer: DeadNodeRecoverer::new(
                identity.clone(),
                registry.clone(),
                job_store.clone(),
                clock.clone(),
                state.clone(),
            ),
            scaler: ScaleController::new(
                identity.clone(),
                scale_config,
                registry.clone(),
                cloud,
                clock,
                state.clone(),
            ),
            state,
            identity,
            leader_config,
            registry,
            job_store,
        }
    }

    pub async fn elect_cluster_leader(&self) -> Result<()> {
        self.elector.elect_cluster_leader().await
    }

    pub async fn refresh_jobs_schedule(&self, ignore_leader: bool) -> Result<()> {
        self.refresher.refresh_jobs_schedule(ignore_leader).await
    }

    pub async fn queue_scheduled_jobs(&self) -> Result<()> {
        self.queuer.queue_scheduled_jobs().await
    }

    pub async fn assign_queued_jobs(&self) -> Result<()> {
        self.assigner.assign_queued_jobs().await
    }

    pub async fn clean_dead_nodes_jobs(&self) -> Result<()> {
        self.recoverer.clean_dead_nodes_jobs().await
    }

    /// Evaluate the autoscaler against current load and capacity, both
    /// read fresh from the stores.
    pub async fn scale_cluster(&self) -> Result<()> {
        if !self.state.is_leader().await {
            return Ok(());
        }
        let queued = self.job_store.get_queued_jobs().await?;
        let running = self.job_store.get_running_jobs().await?;
        let weights: u64 = queued.iter().map(|j| u64::from(j.weight)).sum::<u64>()
            + running.iter().map(|r| u64::from(r.job.weight)).sum::<u64>();

        let active = self
            .registry
            .get_all_active_nodes_count_by_group(&self.identity.group)
            .await?;
        let capacity = active as u64 * u64::from(self.leader_config.max_weight_per_node);
        if capacity == 0 {
            debug!("No active capacity, skipping scale evaluation");
            return Ok(());
        }
        self.scaler.scale_cluster(weights, capacity).await
    }

    /// Remove drained nodes that finished their work.
    pub async fn clean_inactive_nodes(&self) -> Result<()> {
        if !self.state.is_leader().await {
            return Ok(());
        }
        let busy: HashSet<String> = self
            .job_store
            .get_running_jobs()
            .await?
            .into_iter()
            .map(|r| r.assigned_node_id)
            .collect();
        self.scaler.clean_inactive_nodes(&busy).await
    }
}
