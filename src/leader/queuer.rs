use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::state::LeaderState;
use crate::clock::Clock;
use crate::cron::CronSchedule;
use crate::error::{DroverError, Result};
use crate::store::JobStore;

/// Turns due schedule entries into queued job records.
pub struct JobQueuer {
    job_store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    state: Arc<LeaderState>,
}

impl JobQueuer {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
        state: Arc<LeaderState>,
    ) -> Self {
        Self {
            job_store,
            clock,
            state,
        }
    }

    /// Queue every scheduled job with a live firing.
    ///
    /// The schedule comes from the local mirror; the live locks are
    /// re-read from the store, so a stale mirror heals within one pass.
    /// A firing is skipped when its lock already has a queued or running
    /// instance, or when it has aged past the job's maximum age. The
    /// store write precedes the mirror update; a failed write leaves the
    /// mirror untouched.
    pub async fn queue_scheduled_jobs(&self) -> Result<()> {
        if !self.state.is_leader().await {
            return Ok(());
        }
        let now = self.clock.now();

        let queued = self.job_store.get_queued_jobs().await?;
        let running = self.job_store.get_running_jobs().await?;
        let mut live: HashSet<String> = queued.iter().map(|j| j.lock.clone()).collect();
        for r in &running {
            if !live.insert(r.lock().to_string()) {
                return Err(DroverError::InvariantViolation(format!(
                    "lock {} is both queued and running",
                    r.lock()
                )));
            }
        }

        for job in self.state.schedule().await {
            if live.contains(&job.lock) {
                debug!(
                    job_id = %job.job_id,
                    lock = %job.lock,
                    "Previous instance still live, skipping firing"
                );
                continue;
            }

            let cron = match CronSchedule::parse(&job.schedule.cron) {
                Ok(cron) => cron,
                Err(e) => {
                    warn!(job_id = %job.job_id, error = %e, "Skipping job with invalid cron");
                    continue;
                }
            };
            let max_age = chrono::Duration::from_std(job.schedule.max_job_age)
                .unwrap_or_else(|_| chrono::Duration::zero());
            if !cron.due_within(now, max_age) {
                continue;
            }

            let instance = job.to_queued_job(now);
            self.job_store.create_queued_job(&instance).await?;
            live.insert(instance.lock.clone());
            self.state.insert_queued(instance).await;
            info!(job_id = %job.job_id, lock = %job.lock, "Queued scheduled job");
        }
        Ok(())
    }
}
