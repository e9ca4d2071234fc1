//! Cron parsing and due-check helpers.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;

use crate::error::{DroverError, Result};

/// A parsed cron schedule.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    schedule: Schedule,
    source: String,
}

impl CronSchedule {
    /// Parse a cron expression. Standard 5-field expressions are accepted
    /// and normalized to the 6-field form the `cron` crate expects.
    pub fn parse(expr: &str) -> Result<Self> {
        let normalized = normalize_cron(expr);
        let schedule =
            Schedule::from_str(&normalized).map_err(|e| DroverError::InvalidCron {
                expr: expr.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            schedule,
            source: expr.to_string(),
        })
    }

    pub fn expression(&self) -> &str {
        &self.source
    }

    /// First firing strictly after `after`.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// True iff the schedule has a firing `t` with `t <= now` and
    /// `now - t <= max_age`. Firings that have aged out are skipped, not
    /// backfilled.
    pub fn due_within(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let window_start = now - max_age;
        if self.schedule.includes(window_start) {
            return true;
        }
        matches!(self.schedule.after(&window_start).next(), Some(fire) if fire <= now)
    }
}

/// Normalize a 5-field cron expression to the 6-field form by prepending
/// a seconds field. 6-field and 7-field expressions pass through as-is.
fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}
