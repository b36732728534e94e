//! Case report queries.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{to_db_time, Pool, StoreError};
use crate::detect::{AlertLevel, CaseReport, ReportStore};

const REPORT_COLUMNS: &str =
    "id, state, district, disease, cases_count, report_date, alert_level, is_active, source_url, alert_text";

/// A report as handed in by ingestion; the alert tag is derived on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCaseReport {
    pub state: String,
    pub district: String,
    pub disease: String,
    pub cases_count: u32,
    pub report_date: DateTime<Utc>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub alert_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiseaseStat {
    pub disease: String,
    pub count: i64,
    pub total_cases: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateStat {
    pub state: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStats {
    pub total_active: i64,
    pub by_disease: Vec<DiseaseStat>,
    pub by_state: Vec<StateStat>,
}

/// SQLite-backed case report store.
#[derive(Clone)]
pub struct SqliteReportStore {
    pool: Pool,
}

impl SqliteReportStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn insert(&self, report: &NewCaseReport) -> Result<i64, StoreError> {
        let conn = self.pool.get()?;
        let level = AlertLevel::from_case_count(report.cases_count);

        conn.execute(
            "INSERT INTO case_reports
                (state, district, disease, cases_count, report_date, alert_level, source_url, alert_text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                report.state.trim(),
                report.district.trim(),
                report.disease.trim(),
                report.cases_count,
                to_db_time(report.report_date),
                level.as_str(),
                report.source_url,
                report.alert_text,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub fn get(&self, id: i64) -> Result<Option<CaseReport>, StoreError> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {} FROM case_reports WHERE id = ?1", REPORT_COLUMNS);
        Ok(conn.query_row(&sql, params![id], map_report).optional()?)
    }

    /// Active reports, newest first.
    pub fn list_active(&self, limit: usize) -> Result<Vec<CaseReport>, StoreError> {
        self.query(
            "is_active = 1 ORDER BY report_date DESC LIMIT ?1",
            params![limit as i64],
        )
    }

    pub fn by_district(&self, district: &str, limit: usize) -> Result<Vec<CaseReport>, StoreError> {
        self.query(
            "district = ?1 ORDER BY report_date DESC LIMIT ?2",
            params![district, limit as i64],
        )
    }

    pub fn by_disease(&self, disease: &str, limit: usize) -> Result<Vec<CaseReport>, StoreError> {
        self.query(
            "disease = ?1 ORDER BY report_date DESC LIMIT ?2",
            params![disease, limit as i64],
        )
    }

    /// Most recent report for a pair; alerts are linked to it.
    pub fn latest_for(&self, district: &str, disease: &str) -> Result<Option<CaseReport>, StoreError> {
        Ok(self
            .query(
                "district = ?1 AND disease = ?2 ORDER BY report_date DESC LIMIT 1",
                params![district, disease],
            )?
            .into_iter()
            .next())
    }

    /// All-time row count for a pair, regardless of window.
    pub fn count_for(&self, district: &str, disease: &str) -> Result<i64, StoreError> {
        let conn = self.pool.get()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM case_reports WHERE district = ?1 AND disease = ?2",
            params![district, disease],
            |row| row.get(0),
        )?)
    }

    pub fn distinct_districts(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT DISTINCT district FROM case_reports ORDER BY district")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn stats(&self) -> Result<ReportStats, StoreError> {
        let conn = self.pool.get()?;

        let total_active: i64 = conn.query_row(
            "SELECT COUNT(*) FROM case_reports WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT disease, COUNT(*), COALESCE(SUM(cases_count), 0) FROM case_reports
             WHERE is_active = 1 GROUP BY disease ORDER BY disease",
        )?;
        let by_disease = stmt
            .query_map([], |row| {
                Ok(DiseaseStat {
                    disease: row.get(0)?,
                    count: row.get(1)?,
                    total_cases: row.get(2)?,
                })
            })?
            .collect::<Result<_, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT state, COUNT(*) FROM case_reports
             WHERE is_active = 1 GROUP BY state ORDER BY state",
        )?;
        let by_state = stmt
            .query_map([], |row| {
                Ok(StateStat {
                    state: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<_, _>>()?;

        Ok(ReportStats {
            total_active,
            by_disease,
            by_state,
        })
    }

    fn query(&self, clause: &str, params: impl rusqlite::Params) -> Result<Vec<CaseReport>, StoreError> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {} FROM case_reports WHERE {}", REPORT_COLUMNS, clause);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, map_report)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

impl ReportStore for SqliteReportStore {
    fn reports_between(
        &self,
        district: &str,
        disease: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CaseReport>, StoreError> {
        self.query(
            "district = ?1 AND disease = ?2 AND report_date >= ?3 AND report_date <= ?4
             ORDER BY report_date ASC",
            params![district, disease, to_db_time(from), to_db_time(to)],
        )
    }
}

fn map_report(row: &Row<'_>) -> rusqlite::Result<CaseReport> {
    let date: String = row.get(5)?;
    let level: String = row.get(6)?;

    Ok(CaseReport {
        id: row.get(0)?,
        state: row.get(1)?,
        district: row.get(2)?,
        disease: row.get(3)?,
        cases_count: row.get(4)?,
        report_date: DateTime::parse_from_rfc3339(&date)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(5, e))?,
        alert_level: level.parse::<AlertLevel>().map_err(|e| conversion_error(6, e))?,
        is_active: row.get(7)?,
        source_url: row.get(8)?,
        alert_text: row.get(9)?,
    })
}

pub(crate) fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
}
