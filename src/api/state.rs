use crate::scheduler::SweepContext;
use crate::storage::{Pool, SqliteReportStore};

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub reports: SqliteReportStore,
    pub sweep: SweepContext,
    /// Language for interactive checks that name none.
    pub default_language: String,
}

impl AppState {
    pub fn new(sweep: SweepContext, default_language: &str) -> Self {
        Self {
            pool: sweep.pool.clone(),
            reports: SqliteReportStore::new(sweep.pool.clone()),
            sweep,
            default_language: default_language.to_string(),
        }
    }
}
