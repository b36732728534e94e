//! Demo surveillance data for local runs and dashboards.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::reports::NewCaseReport;
use crate::storage::{SqliteReportStore, StoreError};

const DISTRICTS: [(&str, &str); 6] = [
    ("Maharashtra", "Pune"),
    ("Maharashtra", "Nagpur"),
    ("Kerala", "Kochi"),
    ("Uttar Pradesh", "Lucknow"),
    ("West Bengal", "Kolkata"),
    ("Tamil Nadu", "Chennai"),
];

const WEEKS: i64 = 12;

/// Weekly reports for every district/disease pair over the last twelve
/// weeks. Roughly one pair in four gets a current-week surge.
pub fn generate(diseases: &[String], now: DateTime<Utc>, seed: u64) -> Vec<NewCaseReport> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::new();

    for (state, district) in DISTRICTS {
        for disease in diseases {
            let base: u32 = rng.gen_range(5..60);
            let surge = rng.gen_bool(0.25);

            for week in (0..WEEKS).rev() {
                let jitter = rng.gen_range(0..=base / 4 + 1);
                let mut cases = base - base / 8 + jitter;
                if week == 0 && surge {
                    cases = cases * rng.gen_range(15..35) / 10;
                }
                out.push(NewCaseReport {
                    state: state.to_string(),
                    district: district.to_string(),
                    disease: disease.clone(),
                    cases_count: cases,
                    report_date: now - Duration::days(week * 7 + 1),
                    source_url: None,
                    alert_text: (week == 0 && surge).then(|| format!("{} rising in {}", disease, district)),
                });
            }
        }
    }

    out
}

/// Insert generated reports; returns how many were written.
pub fn seed_store(store: &SqliteReportStore, reports: &[NewCaseReport]) -> Result<usize, StoreError> {
    for r in reports {
        store.insert(r)?;
    }
    Ok(reports.len())
}
