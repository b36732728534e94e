//! outbreakwatch -- disease outbreak detection and district alerting.
//!
//! This crate provides the core library for case-report storage, outbreak
//! analysis, localized alert rendering and delivery, and the scheduled
//! district sweep.

pub mod alerts;
pub mod api;
pub mod config;
pub mod detect;
pub mod scheduler;
pub mod seed;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::alerts::{LogNotifier, Notifier, WebhookNotifier};
use crate::config::{Config, NotifyConfig};

/// Webhook delivery when a gateway is configured, log-only otherwise.
pub fn build_notifier(cfg: &NotifyConfig) -> Result<Arc<dyn Notifier>> {
    match cfg.webhook_url.as_deref() {
        Some(url) => {
            let timeout = Duration::from_secs(cfg.timeout_secs.max(1));
            Ok(Arc::new(WebhookNotifier::new(url, timeout)?))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}

/// Start the outbreakwatch daemon: API server and sweep scheduler.
pub async fn serve(config: &Config, bind: &str) -> Result<()> {
    // 1. Initialize Storage
    let db_path = config.storage.db_path.display().to_string();
    tracing::info!(%db_path, "Initializing database");
    let pool = storage::open_pool(&config.storage.db_path)?;

    // 2. Sweep context shared by the scheduler and the API
    let notifier = build_notifier(&config.notify)?;
    let sweep = scheduler::SweepContext::from_config(pool, notifier, &config.sweep);

    // 3. Start Scheduler Engine (background task)
    if config.sweep.enabled {
        let schedule = scheduler::SweepSchedule::parse(&config.sweep.cron)?;
        let ctx = sweep.clone();
        tokio::spawn(async move {
            scheduler::run_scheduler_loop(ctx, schedule).await;
        });
    } else {
        tracing::info!("Scheduled sweep disabled");
    }

    // 4. Start API Server
    let addr: std::net::SocketAddr = bind.parse()?;
    let state = api::state::AppState::new(sweep, &config.server.default_language);
    let app = if config.server.permissive_cors {
        api::router_with_cors(state)
    } else {
        api::router(state)
    };

    tracing::info!(%addr, "outbreakwatch listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
