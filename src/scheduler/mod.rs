//! Daily outbreak sweep: cron timing, the batch driver, and the background loop.

pub mod cron;
pub mod engine;
pub mod sweep;

pub use self::cron::SweepSchedule;
pub use self::engine::run_scheduler_loop;
pub use self::sweep::{run_sweep, SweepContext, SweepSummary};
