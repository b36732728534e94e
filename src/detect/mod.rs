//! Outbreak detection -- baseline comparison and alert classification.

pub mod analyzer;
pub mod baseline;

pub use analyzer::{classify, OutbreakAnalyzer, ReportStore};
pub use baseline::Increase;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::storage::StoreError;

/// Length of the full lookback window, current week included.
pub const HISTORICAL_WINDOW_DAYS: i64 = 84;
/// Length of the current window compared against the baseline.
pub const CURRENT_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Severity classification, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertLevel {
    pub const ALL: [AlertLevel; 4] = [
        AlertLevel::Low,
        AlertLevel::Medium,
        AlertLevel::High,
        AlertLevel::Critical,
    ];

    /// Map an increase over baseline to a level. Thresholds apply to the
    /// unrounded percentage.
    pub fn from_increase(increase: Increase) -> Self {
        match increase {
            Increase::Unbounded => AlertLevel::Critical,
            Increase::Percent(p) if p >= 100.0 => AlertLevel::Critical,
            Increase::Percent(p) if p >= 50.0 => AlertLevel::High,
            Increase::Percent(p) if p >= 20.0 => AlertLevel::Medium,
            Increase::Percent(_) => AlertLevel::Low,
        }
    }

    /// Tag assigned to a single report when it is written, from its raw count.
    /// Unrelated to the baseline comparison.
    pub fn from_case_count(cases: u32) -> Self {
        match cases {
            c if c >= 1000 => AlertLevel::Critical,
            c if c >= 500 => AlertLevel::High,
            c if c >= 100 => AlertLevel::Medium,
            _ => AlertLevel::Low,
        }
    }

    pub fn is_outbreak(self) -> bool {
        self >= AlertLevel::Medium
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertLevel::Low => "LOW",
            AlertLevel::Medium => "MEDIUM",
            AlertLevel::High => "HIGH",
            AlertLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(AlertLevel::Low),
            "MEDIUM" => Ok(AlertLevel::Medium),
            "HIGH" => Ok(AlertLevel::High),
            "CRITICAL" => Ok(AlertLevel::Critical),
            other => Err(format!("unknown alert level '{}'", other)),
        }
    }
}

/// One surveillance observation for a district and disease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseReport {
    pub id: i64,
    pub state: String,
    pub district: String,
    pub disease: String,
    pub cases_count: u32,
    pub report_date: DateTime<Utc>,
    pub alert_level: AlertLevel,
    pub is_active: bool,
    pub source_url: Option<String>,
    pub alert_text: Option<String>,
}

/// Date boundaries of one analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisWindow {
    pub historical_from: DateTime<Utc>,
    pub current_from: DateTime<Utc>,
    pub as_of: DateTime<Utc>,
}

impl AnalysisWindow {
    pub fn ending_at(as_of: DateTime<Utc>) -> Self {
        Self {
            historical_from: as_of - Duration::days(HISTORICAL_WINDOW_DAYS),
            current_from: as_of - Duration::days(CURRENT_WINDOW_DAYS),
            as_of,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.historical_from && at <= self.as_of
    }

    /// Reports on the current-window boundary belong to the current week.
    pub fn is_current(&self, at: DateTime<Utc>) -> bool {
        at >= self.current_from
    }
}

/// Classification produced when enough data was available.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub is_outbreak: bool,
    pub alert_level: AlertLevel,
    pub historical_avg: u64,
    pub current_total: u64,
    #[serde(rename = "increasePercent")]
    pub increase: Increase,
    #[serde(rename = "dateRange")]
    pub window: AnalysisWindow,
}

/// Result of one analysis. `Inconclusive` means "not enough data", which
/// callers must not read as "no outbreak".
#[derive(Debug, Clone, PartialEq)]
pub enum OutbreakVerdict {
    Inconclusive,
    Assessed(Assessment),
}

impl OutbreakVerdict {
    pub fn enough_data(&self) -> bool {
        matches!(self, OutbreakVerdict::Assessed(_))
    }

    pub fn assessment(&self) -> Option<&Assessment> {
        match self {
            OutbreakVerdict::Assessed(a) => Some(a),
            OutbreakVerdict::Inconclusive => None,
        }
    }
}

impl Serialize for OutbreakVerdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Wire<'a> {
            enough_data: bool,
            #[serde(flatten)]
            assessment: Option<&'a Assessment>,
        }

        Wire {
            enough_data: self.enough_data(),
            assessment: self.assessment(),
        }
        .serialize(serializer)
    }
}
