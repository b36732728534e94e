use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use cron::Schedule as CronSchedule;

/// When the background sweep fires.
#[derive(Debug, Clone)]
pub struct SweepSchedule {
    expr: String,
    schedule: CronSchedule,
}

impl SweepSchedule {
    pub fn parse(expr: &str) -> Result<Self> {
        let schedule = CronSchedule::from_str(expr)
            .map_err(|e| anyhow::anyhow!("Invalid cron expression '{}': {}", expr, e))?;
        Ok(Self {
            expr: expr.to_string(),
            schedule,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }

    /// Fire times in the next `hours`. Strictly a dry-run preview.
    pub fn preview(&self, now: DateTime<Utc>, hours: u64) -> Vec<DateTime<Utc>> {
        let end = now + Duration::hours(hours as i64);
        self.schedule.after(&now).take_while(|t| *t <= end).collect()
    }
}
