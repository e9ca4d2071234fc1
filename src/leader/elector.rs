use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use super::state::LeaderState;
use crate::clock::Clock;
use crate::config::{LeaderConfig, NodeIdentity};
use crate::error::{DroverError, Result};
use crate::job::{QueuedJob, RunningJob};
use crate::store::{JobStore, NodeRegistry, ScheduleSource};

/// Decides whether the local node should hold leadership for its group.
///
/// The leader is the oldest active node in the group, node id as the
/// tie-break, provided it has been a member for at least the configured
/// minimum age. A group whose oldest node is younger than that elects
/// nobody, so a just-bootstrapped cluster does not crown a transient
/// leader.
pub struct LeaderElector {
    identity: NodeIdentity,
    config: LeaderConfig,
    registry: Arc<dyn NodeRegistry>,
    job_store: Arc<dyn JobStore>,
    schedule_source: Arc<dyn ScheduleSource>,
    clock: Arc<dyn Clock>,
    state: Arc<LeaderState>,
}

impl LeaderElector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: NodeIdentity,
        config: LeaderConfig,
        registry: Arc<dyn NodeRegistry>,
        job_store: Arc<dyn JobStore>,
        schedule_source: Arc<dyn ScheduleSource>,
        clock: Arc<dyn Clock>,
        state: Arc<LeaderState>,
    ) -> Self {
        Self {
            identity,
            config,
            registry,
            job_store,
            schedule_source,
            clock,
            state,
        }
    }

    /// Recompute the local leader flag from the registry.
    ///
    /// On a false-to-true flip the mirror is loaded from the stores before
    /// the flag becomes visible; on true-to-false the mirror is cleared in
    /// the same step as the flag. Store errors propagate and leave the
    /// previous state untouched.
    pub async fn elect_cluster_leader(&self) -> Result<()> {
        let now = self.clock.now();
        let mut candidates: Vec<_> = self
            .registry
            .get_all_nodes()
            .await?
            .into_iter()
            .filter(|n| n.group == self.identity.group && n.active)
            .collect();
        candidates.sort_by(|a, b| {
            a.join_time
                .cmp(&b.join_time)
                .then_with(|| a.node_id.cmp(&b.node_id))
        });

        let should_lead = match candidates.first() {
            Some(head) => {
                let age = head.age(now);
                let too_young = age
                    .to_std()
                    .map(|a| a < self.config.youngest_leader_age)
                    .unwrap_or(true);
                if too_young {
                    debug!(
                        oldest = %head.node_id,
                        age_secs = age.num_seconds(),
                        "Oldest active node still too young, leaving group leaderless"
                    );
                    false
                } else {
                    head.node_id == self.identity.node_id
                }
            }
            None => false,
        };

        let was_leader = self.state.is_leader().await;
        if should_lead && !was_leader {
            let schedule = self.schedule_source.get_jobs_schedule().await?;
            let queued = self.job_store.get_queued_jobs().await?;
            let running = self.job_store.get_running_jobs().await?;
            check_lock_uniqueness(&queued, &running)?;
            self.state.assume_leadership(schedule, queued, running).await;
            info!(
                node_id = %self.identity.node_id,
                group = %self.identity.group,
                "Assumed group leadership"
            );
        } else if !should_lead && was_leader {
            self.state.resign_leadership().await;
            info!(
                node_id = %self.identity.node_id,
                group = %self.identity.group,
                "Resigned group leadership"
            );
        }
        Ok(())
    }
}

/// A lock live in both queued and running means the store has diverged
/// from the rules every leader maintains; refusing leadership is safer
/// than scheduling on top of it.
fn check_lock_uniqueness(queued: &[QueuedJob], running: &[RunningJob]) -> Result<()> {
    let queued_locks: HashSet<&str> = queued.iter().map(|j| j.lock.as_str()).collect();
    if let Some(conflict) = running.iter().find(|r| queued_locks.contains(r.lock())) {
        return Err(DroverError::InvariantViolation(format!(
            "lock {} is both queued and running",
            conflict.lock()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobSchedule, ScheduledJob};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    fn queued_job(lock: &str) -> QueuedJob {
        ScheduledJob {
            job_id: format!("job-{lock}"),
            lock: lock.to_string(),
            job_type: "batch".to_string(),
            weight: 10,
            data: HashMap::new(),
            schedule: JobSchedule {
                cron: "0 * * * *".to_string(),
                max_job_age: std::time::Duration::from_secs(60),
            },
            max_attempts: 3,
            priority: 5,
            min_version: None,
        }
        .to_queued_job(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_lock_uniqueness_check() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let queued = vec![queued_job("a")];
        let running = vec![queued_job("b").start_on("node-1", now)];
        assert!(check_lock_uniqueness(&queued, &running).is_ok());

        let conflicting = vec![queued_job("a").start_on("node-1", now)];
        assert!(matches!(
            check_lock_uniqueness(&queued, &conflicting),
            Err(DroverError::InvariantViolation(_))
        ));
    }
}
