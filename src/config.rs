use std::time::Duration;

use crate::error::{DroverError, Result};

/// Identity of the local node within the cluster.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub node_id: String,
    /// Group label; leadership and placement are scoped per group.
    pub group: String,
}

impl NodeIdentity {
    pub fn new(node_id: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            group: group.into(),
        }
    }
}

/// Leader-side scheduling configuration.
#[derive(Debug, Clone)]
pub struct LeaderConfig {
    /// Placement holds back until this many nodes are active in the group.
    pub min_active_nodes: usize,
    /// Summed job weight a single node may carry.
    pub max_weight_per_node: u32,
    /// A group whose oldest active node is younger than this elects nobody.
    pub youngest_leader_age: Duration,
    /// When false the leader's own node never receives assignments.
    pub leader_also_worker: bool,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            min_active_nodes: 1,
            max_weight_per_node: 100,
            youngest_leader_age: Duration::from_secs(10),
            leader_also_worker: true,
        }
    }
}

impl LeaderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_weight_per_node == 0 {
            return Err(DroverError::ConfigInvalid(
                "max_weight_per_node must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Autoscaler configuration. Thresholds are integer percentages of
/// cluster capacity.
#[derive(Debug, Clone)]
pub struct ScaleConfig {
    pub min_nodes: usize,
    pub max_nodes: usize,
    /// Minimum gap between two scale actions.
    pub cool_down_period: Duration,
    pub scale_down_threshold: u32,
    pub scale_up_threshold: u32,
    /// How long a threshold breach must persist before acting.
    pub evaluation_period: Duration,
    pub scale_up_step: usize,
    pub scale_down_step: usize,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            min_nodes: 1,
            max_nodes: 10,
            cool_down_period: Duration::from_secs(60),
            scale_down_threshold: 40,
            scale_up_threshold: 80,
            evaluation_period: Duration::from_secs(30),
            scale_up_step: 1,
            scale_down_step: 1,
        }
    }
}

impl ScaleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.scale_down_threshold >= self.scale_up_threshold {
            return Err(DroverError::ConfigInvalid(format!(
                "scale_down_threshold ({}) must be below scale_up_threshold ({}), \
                 otherwise the dead band is empty and the controller oscillates",
                self.scale_down_threshold, self.scale_up_threshold
            )));
        }
        if self.max_nodes < self.min_nodes {
            return Err(DroverError::ConfigInvalid(format!(
                "max_nodes ({}) must not be below min_nodes ({})",
                self.max_nodes, self.min_nodes
            )));
        }
        if self.scale_up_step == 0 || self.scale_down_step == 0 {
            return Err(DroverError::ConfigInvalid(
                "scale steps must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// How often each duty fires on the local node.
#[derive(Debug, Clone)]
pub struct DutyIntervals {
    pub election: Duration,
    pub schedule_refresh: Duration,
    pub queue: Duration,
    pub assign: Duration,
    pub recover: Duration,
    pub scale: Duration,
    pub reap: Duration,
}

impl Default for DutyIntervals {
    fn default() -> Self {
        Self {
            election: Duration::from_secs(5),
            schedule_refresh: Duration::from_secs(60),
            queue: Duration::from_secs(1),
            assign: Duration::from_secs(1),
            recover: Duration::from_secs(10),
            scale: Duration::from_secs(10),
            reap: Duration::from_secs(30),
        }
    }
}

/// Full configuration for one cluster node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub identity: NodeIdentity,
    pub leader: LeaderConfig,
    pub scale: ScaleConfig,
    pub intervals: DutyIntervals,
}

impl NodeConfig {
    pub fn new(node_id: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            identity: NodeIdentity::new(node_id, group),
            leader: LeaderConfig::default(),
            scale: ScaleConfig::default(),
            intervals: DutyIntervals::default(),
        }
    }

    /// Validate at startup; a node with an invalid config refuses to run.
    pub fn validate(&self) -> Result<()> {
        self.leader.validate()?;
        self.scale.validate()?;
        Ok(())
    }
}
