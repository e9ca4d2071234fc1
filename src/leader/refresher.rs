use std::sync::Arc;

use tracing::debug;

use super::state::LeaderState;
use crate::error::Result;
use crate::store::ScheduleSource;

/// Pulls the declared schedule into the local mirror.
pub struct ScheduleRefresher {
    schedule_source: Arc<dyn ScheduleSource>,
    state: Arc<LeaderState>,
}

impl ScheduleRefresher {
    pub fn new(schedule_source: Arc<dyn ScheduleSource>, state: Arc<LeaderState>) -> Self {
        Self {
            schedule_source,
            state,
        }
    }

    /// Replace the schedule mirror with a fresh snapshot. Followers skip
    /// the pull unless `ignore_leader` is set, which any node may use to
    /// warm its cache ahead of a leadership change.
    pub async fn refresh_jobs_schedule(&self, ignore_leader: bool) -> Result<()> {
        if !ignore_leader && !self.state.is_leader().await {
            return Ok(());
        }
        let schedule = self.schedule_source.get_jobs_schedule().await?;
        debug!(jobs = schedule.len(), "Refreshed schedule mirror");
        self.state.replace_schedule(schedule).await;
        Ok(())
    }
}
