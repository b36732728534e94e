use chrono::Utc;
use tracing::{error, info, warn};

use super::cron::SweepSchedule;
use super::sweep::{run_sweep, SweepContext};

/// Main scheduler execution loop.
/// Sleeps until the next fire time of `schedule`, then runs a sweep.
pub async fn run_scheduler_loop(ctx: SweepContext, schedule: SweepSchedule) {
    info!(cron = %schedule.expr(), "Scheduler engine started");

    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            warn!(cron = %schedule.expr(), "Schedule has no future fire times, stopping");
            return;
        };

        let wait = (next - now).to_std().unwrap_or_default();
        info!(next = %next.to_rfc3339(), "Next outbreak sweep scheduled");
        tokio::time::sleep(wait).await;

        match run_sweep(&ctx, "scheduled", Utc::now()).await {
            Ok(summary) => {
                info!(
                    run_id = %summary.run_id,
                    outbreaks = summary.outbreaks.len(),
                    failures = summary.failures.len(),
                    "Scheduled sweep complete"
                );
            }
            Err(e) => {
                error!("Scheduled sweep failed: {:#}", e);
            }
        }
    }
}
