use chrono::{DateTime, Utc};
use tracing::debug;

use super::baseline::{round_half_up, CaseSeries, Increase};
use super::{AlertLevel, AnalysisWindow, Assessment, CaseReport, DetectError, OutbreakVerdict};
use crate::storage::StoreError;

/// Below any of these counts an analysis is inconclusive.
pub const MIN_TOTAL_REPORTS: usize = 4;
pub const MIN_HISTORICAL_REPORTS: usize = 3;
pub const MIN_CURRENT_REPORTS: usize = 1;

/// Read access to case reports, keyed by district + disease + date.
pub trait ReportStore {
    /// Reports for the pair with `from <= report_date <= to`, oldest first.
    fn reports_between(
        &self,
        district: &str,
        disease: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CaseReport>, StoreError>;
}

impl<T: ReportStore + ?Sized> ReportStore for &T {
    fn reports_between(
        &self,
        district: &str,
        disease: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CaseReport>, StoreError> {
        (**self).reports_between(district, disease, from, to)
    }
}

/// Compares the current week against the preceding eleven-week baseline.
pub struct OutbreakAnalyzer<S> {
    store: S,
}

impl<S: ReportStore> OutbreakAnalyzer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn analyze(
        &self,
        district: &str,
        disease: &str,
        as_of: DateTime<Utc>,
    ) -> Result<OutbreakVerdict, DetectError> {
        if district.trim().is_empty() {
            return Err(DetectError::MissingField("district"));
        }
        if disease.trim().is_empty() {
            return Err(DetectError::MissingField("disease"));
        }

        let window = AnalysisWindow::ending_at(as_of);
        let reports =
            self.store
                .reports_between(district, disease, window.historical_from, window.as_of)?;

        let verdict = classify(&reports, window);
        match &verdict {
            OutbreakVerdict::Inconclusive => {
                debug!(%district, %disease, fetched = reports.len(), "Insufficient data")
            }
            OutbreakVerdict::Assessed(a) => {
                debug!(%district, %disease, level = %a.alert_level, outbreak = a.is_outbreak, "Analyzed")
            }
        }
        Ok(verdict)
    }
}

/// Partition `reports` over `window` and classify the current week.
pub fn classify(reports: &[CaseReport], window: AnalysisWindow) -> OutbreakVerdict {
    let (current, historical): (Vec<&CaseReport>, Vec<&CaseReport>) = reports
        .iter()
        .filter(|r| window.contains(r.report_date))
        .partition(|r| window.is_current(r.report_date));

    if current.len() + historical.len() < MIN_TOTAL_REPORTS
        || historical.len() < MIN_HISTORICAL_REPORTS
        || current.len() < MIN_CURRENT_REPORTS
    {
        return OutbreakVerdict::Inconclusive;
    }

    let historical = CaseSeries::new(historical.iter().map(|r| u64::from(r.cases_count)).collect());
    let current = CaseSeries::new(current.iter().map(|r| u64::from(r.cases_count)).collect());

    let mean = historical.mean();
    let current_total = current.total();
    let increase = Increase::between(mean, current_total);
    let alert_level = AlertLevel::from_increase(increase);

    OutbreakVerdict::Assessed(Assessment {
        is_outbreak: alert_level.is_outbreak(),
        alert_level,
        historical_avg: round_half_up(mean).max(0) as u64,
        current_total,
        increase,
        window,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    struct MemoryStore(Vec<CaseReport>);

    impl ReportStore for MemoryStore {
        fn reports_between(
            &self,
            district: &str,
            disease: &str,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<CaseReport>, StoreError> {
            let mut out: Vec<CaseReport> = self
                .0
                .iter()
                .filter(|r| r.district == district && r.disease == disease)
                .filter(|r| r.report_date >= from && r.report_date <= to)
                .cloned()
                .collect();
            out.sort_by_key(|r| r.report_date);
            Ok(out)
        }
    }

    struct BrokenStore;

    impl ReportStore for BrokenStore {
        fn reports_between(
            &self,
            _: &str,
            _: &str,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> Result<Vec<CaseReport>, StoreError> {
            Err(StoreError::Corrupt("disk gone".into()))
        }
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 20, 9, 0, 0).unwrap()
    }

    fn report(days_ago: i64, cases: u32) -> CaseReport {
        CaseReport {
            id: 0,
            state: "Maharashtra".into(),
            district: "Pune".into(),
            disease: "Dengue".into(),
            cases_count: cases,
            report_date: as_of() - Duration::days(days_ago),
            alert_level: AlertLevel::from_case_count(cases),
            is_active: true,
            source_url: None,
            alert_text: None,
        }
    }

    fn analyze(reports: Vec<CaseReport>) -> OutbreakVerdict {
        OutbreakAnalyzer::new(MemoryStore(reports))
            .analyze("Pune", "Dengue", as_of())
            .unwrap()
    }

    #[test]
    fn test_fewer_than_four_reports_is_inconclusive() {
        let v = analyze(vec![report(30, 5), report(20, 5), report(2, 50)]);
        assert_eq!(v, OutbreakVerdict::Inconclusive);
        assert!(!v.enough_data());
        assert!(v.assessment().is_none());
    }

    #[test]
    fn test_thin_history_is_inconclusive() {
        let v = analyze(vec![report(30, 5), report(20, 5), report(3, 8), report(2, 9)]);
        assert_eq!(v, OutbreakVerdict::Inconclusive);
    }

    #[test]
    fn test_no_current_week_is_inconclusive() {
        let v = analyze(vec![report(40, 5), report(30, 5), report(20, 5), report(10, 5)]);
        assert_eq!(v, OutbreakVerdict::Inconclusive);
    }

    #[test]
    fn test_twenty_percent_is_medium() {
        let v = analyze(vec![
            report(40, 8),
            report(30, 10),
            report(20, 12),
            report(3, 7),
            report(1, 5),
        ]);
        let a = v.assessment().expect("assessed");
        assert_eq!(a.historical_avg, 10);
        assert_eq!(a.current_total, 12);
        assert_eq!(a.increase.percent(), Some(20));
        assert_eq!(a.alert_level, AlertLevel::Medium);
        assert!(a.is_outbreak);
    }

    #[test]
    fn test_nineteen_percent_is_low() {
        let v = analyze(vec![report(40, 100), report(30, 100), report(20, 100), report(1, 119)]);
        let a = v.assessment().expect("assessed");
        assert_eq!(a.increase.percent(), Some(19));
        assert_eq!(a.alert_level, AlertLevel::Low);
        assert!(!a.is_outbreak);
    }

    #[test]
    fn test_just_under_twenty_percent_is_low() {
        // 19.6% over a 100.33 mean reports as 20% but stays below the threshold.
        let v = analyze(vec![report(40, 100), report(30, 100), report(20, 101), report(1, 120)]);
        let a = v.assessment().expect("assessed");
        assert_eq!(a.historical_avg, 100);
        assert_eq!(a.increase.percent(), Some(20));
        assert_eq!(a.alert_level, AlertLevel::Low);
        assert!(!a.is_outbreak);
    }

    #[test]
    fn test_doubling_is_critical() {
        let v = analyze(vec![report(40, 5), report(30, 5), report(20, 5), report(1, 10)]);
        let a = v.assessment().expect("assessed");
        assert_eq!(a.historical_avg, 5);
        assert_eq!(a.current_total, 10);
        assert_eq!(a.increase.percent(), Some(100));
        assert_eq!(a.alert_level, AlertLevel::Critical);
        assert!(a.is_outbreak);
    }

    #[test]
    fn test_boundary_report_counts_as_current() {
        // Exactly seven days old: current week, so history has only three rows.
        let v = analyze(vec![report(40, 5), report(30, 5), report(20, 5), report(7, 15)]);
        let a = v.assessment().expect("assessed");
        assert_eq!(a.current_total, 15);
        assert_eq!(a.historical_avg, 5);
        assert_eq!(a.alert_level, AlertLevel::Critical);
    }

    #[test]
    fn test_reports_outside_window_are_ignored() {
        let v = analyze(vec![
            report(120, 500),
            report(40, 5),
            report(30, 5),
            report(20, 5),
            report(1, 5),
            report(-2, 900),
        ]);
        let a = v.assessment().expect("assessed");
        assert_eq!(a.current_total, 5);
        assert_eq!(a.alert_level, AlertLevel::Low);
    }

    #[test]
    fn test_zero_baseline_with_cases_is_critical() {
        let v = analyze(vec![report(40, 0), report(30, 0), report(20, 0), report(1, 4)]);
        let a = v.assessment().expect("assessed");
        assert_eq!(a.increase, Increase::Unbounded);
        assert_eq!(a.alert_level, AlertLevel::Critical);
    }

    #[test]
    fn test_zero_baseline_without_cases_is_low() {
        let v = analyze(vec![report(40, 0), report(30, 0), report(20, 0), report(1, 0)]);
        let a = v.assessment().expect("assessed");
        assert_eq!(a.increase, Increase::Percent(0.0));
        assert_eq!(a.alert_level, AlertLevel::Low);
    }

    #[test]
    fn test_other_pairs_do_not_leak_in() {
        let mut other = report(1, 400);
        other.disease = "Malaria".into();
        let v = analyze(vec![report(40, 5), report(30, 5), report(20, 5), report(1, 5), other]);
        assert_eq!(v.assessment().unwrap().current_total, 5);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let analyzer = OutbreakAnalyzer::new(MemoryStore(vec![]));
        assert!(matches!(
            analyzer.analyze(" ", "Dengue", as_of()),
            Err(DetectError::MissingField("district"))
        ));
        assert!(matches!(
            analyzer.analyze("Pune", "", as_of()),
            Err(DetectError::MissingField("disease"))
        ));
    }

    #[test]
    fn test_store_failure_propagates() {
        let err = OutbreakAnalyzer::new(BrokenStore)
            .analyze("Pune", "Dengue", as_of())
            .unwrap_err();
        assert!(matches!(err, DetectError::Store(_)));
    }
}
