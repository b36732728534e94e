//! Alert rendering and delivery.
//!
//! `format` turns an analysis outcome into a localized message; `dispatch`
//! hands rendered messages to a [`dispatch::Notifier`] and records the outcome
//! for every recipient.

pub mod dispatch;
pub mod format;

pub use dispatch::{deliver, AlertMeta, DispatchError, DispatchReport, LogNotifier, Notifier, WebhookNotifier};
pub use format::{format_alert, FALLBACK_MESSAGE};

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::detect::{AlertLevel, Assessment};

/// A case count that may be missing from an upstream result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseCount {
    Known(u64),
    Unavailable,
}

impl fmt::Display for CaseCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseCount::Known(n) => write!(f, "{}", n),
            CaseCount::Unavailable => f.write_str("N/A"),
        }
    }
}

impl Serialize for CaseCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CaseCount::Known(n) => serializer.serialize_u64(*n),
            CaseCount::Unavailable => serializer.serialize_str("N/A"),
        }
    }
}

/// Detection result as produced by any of the known producers. Older ones
/// name the current-week figure and the baseline differently.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedCounts {
    pub current_cases: Option<u64>,
    pub current_week_count: Option<u64>,
    pub cases_this_week: Option<u64>,
    pub average_cases: Option<u64>,
    pub historical_avg: Option<u64>,
    pub previous_week_avg: Option<u64>,
}

impl ReportedCounts {
    /// `currentCases`, then `currentWeekCount`, then `casesThisWeek`.
    pub fn current_cases(&self) -> CaseCount {
        first_known(&[self.current_cases, self.current_week_count, self.cases_this_week])
    }

    /// `averageCases`, then `historicalAvg`, then `previousWeekAvg`.
    pub fn average_cases(&self) -> CaseCount {
        first_known(&[self.average_cases, self.historical_avg, self.previous_week_avg])
    }
}

impl From<&Assessment> for ReportedCounts {
    fn from(a: &Assessment) -> Self {
        Self {
            current_cases: Some(a.current_total),
            historical_avg: Some(a.historical_avg),
            ..Self::default()
        }
    }
}

fn first_known(candidates: &[Option<u64>]) -> CaseCount {
    candidates
        .iter()
        .flatten()
        .next()
        .map_or(CaseCount::Unavailable, |n| CaseCount::Known(*n))
}

/// Everything a message template interpolates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertContext {
    pub district: String,
    pub disease: String,
    /// `None` when the producer sent a level no template exists for.
    pub alert_level: Option<AlertLevel>,
    pub current_cases: CaseCount,
    pub average_cases: CaseCount,
}

impl AlertContext {
    pub fn new(district: &str, disease: &str, alert_level: AlertLevel, counts: &ReportedCounts) -> Self {
        Self {
            district: district.to_string(),
            disease: disease.to_string(),
            alert_level: Some(alert_level),
            current_cases: counts.current_cases(),
            average_cases: counts.average_cases(),
        }
    }

    pub fn from_assessment(district: &str, disease: &str, a: &Assessment) -> Self {
        Self::new(district, disease, a.alert_level, &ReportedCounts::from(a))
    }
}

/// A saved detection result, in any producer's field naming.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub district: String,
    pub disease: String,
    #[serde(default)]
    pub alert_level: Option<String>,
    #[serde(flatten)]
    pub counts: ReportedCounts,
}

impl DetectionResult {
    /// Levels are matched case-insensitively; anything else renders the
    /// fallback message.
    pub fn context(&self) -> AlertContext {
        AlertContext {
            district: self.district.clone(),
            disease: self.disease.clone(),
            alert_level: self.alert_level.as_deref().and_then(|l| l.trim().parse().ok()),
            current_cases: self.counts.current_cases(),
            average_cases: self.counts.average_cases(),
        }
    }
}
