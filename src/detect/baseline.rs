use serde::{Serialize, Serializer};

/// Case counts for one partition of an analysis window.
pub struct CaseSeries {
    counts: Vec<u64>,
}

impl CaseSeries {
    pub fn new(counts: Vec<u64>) -> Self {
        Self { counts }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn mean(&self) -> f64 {
        if self.counts.is_empty() {
            return 0.0;
        }
        self.total() as f64 / self.counts.len() as f64
    }
}

/// Relative change of the current total over the historical mean.
///
/// Levels are assigned from the exact value; it is rounded only for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Increase {
    /// Unrounded percentage.
    Percent(f64),
    /// Cases appeared against a zero baseline.
    Unbounded,
}

impl Increase {
    pub fn between(baseline_mean: f64, current_total: u64) -> Self {
        if baseline_mean == 0.0 {
            return if current_total == 0 {
                Increase::Percent(0.0)
            } else {
                Increase::Unbounded
            };
        }
        Increase::Percent((current_total as f64 - baseline_mean) * 100.0 / baseline_mean)
    }

    /// Reported percentage, rounded half up.
    pub fn percent(self) -> Option<i64> {
        match self {
            Increase::Percent(p) => Some(round_half_up(p)),
            Increase::Unbounded => None,
        }
    }
}

impl Serialize for Increase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Increase::Percent(p) => serializer.serialize_i64(round_half_up(*p)),
            Increase::Unbounded => serializer.serialize_none(),
        }
    }
}

/// Round to the nearest integer, ties toward positive infinity.
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}
