//! Execution history for outbreak sweeps.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;
use uuid::Uuid;

use super::reports::conversion_error;
use super::{from_db_time, to_db_time, Pool, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "partial" => Some(RunStatus::Partial),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// A record of one sweep execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRun {
    pub id: Uuid,
    pub trigger: String,
    pub status: RunStatus,
    pub pairs_checked: u32,
    pub outbreaks_detected: u32,
    pub failures: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

pub fn start_run(pool: &Pool, trigger: &str) -> Result<Uuid, StoreError> {
    let conn = pool.get()?;
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO sweep_runs (id, trigger, status, started_at) VALUES (?1, ?2, ?3, ?4)",
        params![id.to_string(), trigger, RunStatus::Running.as_str(), to_db_time(Utc::now())],
    )?;
    Ok(id)
}

pub fn finish_run(
    pool: &Pool,
    id: Uuid,
    status: RunStatus,
    pairs_checked: u32,
    outbreaks_detected: u32,
    failures: u32,
) -> Result<(), StoreError> {
    let conn = pool.get()?;
    conn.execute(
        "UPDATE sweep_runs
         SET status = ?1, pairs_checked = ?2, outbreaks_detected = ?3, failures = ?4, finished_at = ?5
         WHERE id = ?6",
        params![
            status.as_str(),
            pairs_checked,
            outbreaks_detected,
            failures,
            to_db_time(Utc::now()),
            id.to_string()
        ],
    )?;
    Ok(())
}

pub fn list_recent(pool: &Pool, limit: usize) -> Result<Vec<SweepRun>, StoreError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, trigger, status, pairs_checked, outbreaks_detected, failures, started_at, finished_at
         FROM sweep_runs ORDER BY started_at DESC LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit as i64], |row| {
        let id: String = row.get(0)?;
        let status: String = row.get(2)?;
        let started_at: String = row.get(6)?;
        let finished_at: Option<String> = row.get(7)?;

        let time = |idx: usize, s: &str| from_db_time(s).map_err(|e| conversion_error(idx, e.to_string()));

        Ok(SweepRun {
            id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
            trigger: row.get(1)?,
            status: RunStatus::parse(&status)
                .ok_or_else(|| conversion_error(2, format!("unknown status '{}'", status)))?,
            pairs_checked: row.get(3)?,
            outbreaks_detected: row.get(4)?,
            failures: row.get(5)?,
            started_at: time(6, &started_at)?,
            finished_at: finished_at.as_deref().map(|s| time(7, s)).transpose()?,
        })
    })?;

    Ok(rows.collect::<Result<_, _>>()?)
}
