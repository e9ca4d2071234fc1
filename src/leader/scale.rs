use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::state::LeaderState;
use crate::clock::Clock;
use crate::config::{NodeIdentity, ScaleConfig};
use crate::error::Result;
use crate::store::{CloudManager, NodeRegistry};

/// Cross-tick controller memory. Kept as one record behind one lock; the
/// three fields move together and the scale duty must never be re-entered
/// concurrently on a node.
#[derive(Debug, Clone, Copy)]
struct ScaleTimers {
    last_scale_activity: DateTime<Utc>,
    scale_up_needed_since: Option<DateTime<Utc>>,
    scale_down_needed_since: Option<DateTime<Utc>>,
}

impl Default for ScaleTimers {
    fn default() -> Self {
        Self {
            last_scale_activity: DateTime::UNIX_EPOCH,
            scale_up_needed_since: None,
            scale_down_needed_since: None,
        }
    }
}

/// Hysteretic capacity autoscaler.
///
/// Utilisation must breach a threshold for the whole evaluation period
/// before the controller acts, and a cool-down gap separates any two
/// actions. Scale-down is two-phase: the youngest nodes are marked
/// inactive first, and the machines are only removed once idle, so
/// in-flight work finishes before a node disappears.
pub struct ScaleController {
    identity: NodeIdentity,
    config: ScaleConfig,
    registry: Arc<dyn NodeRegistry>,
    cloud: Arc<dyn CloudManager>,
    clock: Arc<dyn Clock>,
    state: Arc<LeaderState>,
    timers: Mutex<ScaleTimers>,
}

impl ScaleController {
    pub fn new(
        identity: NodeIdentity,
        config: ScaleConfig,
        registry: Arc<dyn NodeRegistry>,
        cloud: Arc<dyn CloudManager>,
        clock: Arc<dyn Clock>,
        state: Arc<LeaderState>,
    ) -> Self {
        Self {
            identity,
            config,
            registry,
            cloud,
            clock,
            state,
            timers: Mutex::new(ScaleTimers::default()),
        }
    }

    /// Evaluate utilisation and scale when a sustained breach is due.
    ///
    /// `weights` is the summed weight of queued and running jobs;
    /// `capacity` the summed weight capacity of active nodes, which must
    /// be positive.
    pub async fn scale_cluster(&self, weights: u64, capacity: u64) -> Result<()> {
        if !self.state.is_leader().await {
            return Ok(());
        }
        let now = self.clock.now();
        let mut timers = self.timers.lock().await;

        let cooling = (now - timers.last_scale_activity)
            .to_std()
            .map(|gap| gap < self.config.cool_down_period)
            .unwrap_or(true);
        if cooling {
            debug!("Inside cool-down, skipping scale evaluation");
            return Ok(());
        }

        let util = (weights as f64 / capacity as f64) * 100.0;
        if util > f64::from(self.config.scale_up_threshold) {
            timers.scale_down_needed_since = None;
            self.scale_up_if_due(&mut timers, util, now).await?;
        } else if util < f64::from(self.config.scale_down_threshold) {
            timers.scale_up_needed_since = None;
            self.scale_down_if_due(&mut timers, util, now).await?;
        } else {
            // Dead band: a single in-band tick cancels both windows.
            timers.scale_up_needed_since = None;
            timers.scale_down_needed_since = None;
        }
        Ok(())
    }

    async fn scale_up_if_due(
        &self,
        timers: &mut ScaleTimers,
        util: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let since = match timers.scale_up_needed_since {
            None => {
                timers.scale_up_needed_since = Some(now);
                info!(util, "High utilisation, opening scale-up window");
                return Ok(());
            }
            Some(since) => since,
        };
        let elapsed = (now - since)
            .to_std()
            .map(|e| e >= self.config.evaluation_period)
            .unwrap_or(false);
        if !elapsed {
            return Ok(());
        }

        let active = self
            .registry
            .get_all_active_nodes_count_by_group(&self.identity.group)
            .await?;
        if active >= self.config.max_nodes {
            // The ceiling is a resource fact, not a signal change: the
            // window stays open in case nodes free up.
            debug!(active, max_nodes = self.config.max_nodes, "At node ceiling, scale-up stays pending");
            return Ok(());
        }

        let step = self.config.scale_up_step.min(self.config.max_nodes - active);
        // A failed cloud call propagates before the timers change, so the
        // decision re-fires once the cloud recovers.
        self.cloud.scale_up(step).await?;
        info!(step, active, "Requested scale-up");
        timers.last_scale_activity = now;
        timers.scale_up_needed_since = None;
        Ok(())
    }

    async fn scale_down_if_due(
        &self,
        timers: &mut ScaleTimers,
        util: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let since = match timers.scale_down_needed_since {
            None => {
                timers.scale_down_needed_since = Some(now);
                info!(util, "Low utilisation, opening scale-down window");
                return Ok(());
            }
            Some(since) => since,
        };
        let elapsed = (now - since)
            .to_std()
            .map(|e| e >= self.config.evaluation_period)
            .unwrap_or(false);
        if !elapsed {
            return Ok(());
        }

        let active = self
            .registry
            .get_all_active_nodes_count_by_group(&self.identity.group)
            .await?;
        if active <= self.config.min_nodes {
            debug!(active, min_nodes = self.config.min_nodes, "At node floor, scale-down stays pending");
            return Ok(());
        }

        // Youngest first: young nodes are least likely to hold
        // long-running jobs, and the oldest node is the leader.
        let step = self.config.scale_down_step.min(active - self.config.min_nodes);
        let victims = self
            .registry
            .get_youngest_active_nodes_by_group(&self.identity.group, step)
            .await?;
        for node in &victims {
            self.registry.update_node_status(&node.node_id, false).await?;
            info!(node_id = %node.node_id, "Draining node");
        }
        timers.last_scale_activity = now;
        timers.scale_down_needed_since = None;
        Ok(())
    }

    /// Physically remove drained nodes that no longer run anything.
    ///
    /// `nodes_running_jobs` holds the ids of nodes with at least one
    /// running job; those stay alive until their work finishes.
    pub async fn clean_inactive_nodes(&self, nodes_running_jobs: &HashSet<String>) -> Result<()> {
        if !self.state.is_leader().await {
            return Ok(());
        }
        let idle: HashSet<String> = self
            .registry
            .get_all_inactive_nodes_by_group(&self.identity.group)
            .await?
            .into_iter()
            .map(|n| n.node_id)
            .filter(|id| !nodes_running_jobs.contains(id))
            .collect();
        if idle.is_empty() {
            return Ok(());
        }
        info!(count = idle.len(), "Removing idle drained nodes");
        self.cloud.scale_down(idle).await?;
        Ok(())
    }
}
