//! Batch outbreak sweep: analyze every (district, disease) pair and alert the
//! affected districts.
//!
//! Pairs run as independent tasks under a concurrency cap and a per-pair time
//! budget. A failing pair is logged and counted; it never stops the others.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::alerts::{deliver, format_alert, AlertContext, AlertMeta, DispatchError, Notifier};
use crate::config::SweepConfig;
use crate::detect::{AlertLevel, Assessment, CaseReport, DetectError, OutbreakAnalyzer, OutbreakVerdict};
use crate::storage::subscribers::{alert_recipients, Subscriber};
use crate::storage::sweeps::{finish_run, start_run, RunStatus};
use crate::storage::{Pool, SqliteReportStore, StoreError};

#[derive(Debug, Error)]
pub enum PairError {
    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no report to link the alert to")]
    MissingReport,

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Everything a sweep needs, shared by the API and the scheduler.
#[derive(Clone)]
pub struct SweepContext {
    pub pool: Pool,
    pub notifier: Arc<dyn Notifier>,
    pub diseases: Vec<String>,
    pub language: String,
    pub max_concurrency: usize,
    pub pair_timeout: Duration,
}

impl SweepContext {
    pub fn from_config(pool: Pool, notifier: Arc<dyn Notifier>, cfg: &SweepConfig) -> Self {
        Self {
            pool,
            notifier,
            diseases: cfg.diseases.clone(),
            language: cfg.language.clone(),
            max_concurrency: cfg.max_concurrency.max(1),
            pair_timeout: Duration::from_secs(cfg.pair_timeout_secs.max(1)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedOutbreak {
    pub district: String,
    pub disease: String,
    pub alert_level: AlertLevel,
    pub cases_this_week: u64,
    pub outbreak_id: i64,
    pub notified: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairFailure {
    pub district: String,
    pub disease: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub run_id: Uuid,
    pub pairs_checked: u32,
    pub inconclusive: u32,
    pub outbreaks: Vec<DetectedOutbreak>,
    pub failures: Vec<PairFailure>,
}

enum PairOutcome {
    Quiet,
    Inconclusive,
    Outbreak(DetectedOutbreak),
}

/// Run one full sweep as of `as_of`.
pub async fn run_sweep(ctx: &SweepContext, trigger: &str, as_of: DateTime<Utc>) -> Result<SweepSummary> {
    info!(%trigger, "Starting outbreak sweep");

    let pool = ctx.pool.clone();
    let trigger_owned = trigger.to_string();
    let run_id = tokio::task::spawn_blocking(move || start_run(&pool, &trigger_owned))
        .await?
        .context("Failed to record sweep start")?;

    let pool = ctx.pool.clone();
    let districts = match tokio::task::spawn_blocking(move || SqliteReportStore::new(pool).distinct_districts()).await? {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to list districts: {}", e);
            let pool = ctx.pool.clone();
            match tokio::task::spawn_blocking(move || finish_run(&pool, run_id, RunStatus::Failed, 0, 0, 1)).await {
                Ok(Err(fe)) => error!(%run_id, "Failed to record sweep result: {}", fe),
                Err(je) => error!(%run_id, "Failed to record sweep result: {}", je),
                Ok(Ok(())) => {}
            }
            return Err(e).context("Failed to list districts");
        }
    };

    let semaphore = Arc::new(Semaphore::new(ctx.max_concurrency));
    let mut tasks = JoinSet::new();

    for district in &districts {
        for disease in &ctx.diseases {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .context("sweep semaphore closed")?;
            let ctx = ctx.clone();
            let district = district.clone();
            let disease = disease.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let result = check_pair(&ctx, &district, &disease, as_of).await;
                (district, disease, result)
            });
        }
    }

    let mut summary = SweepSummary {
        run_id,
        pairs_checked: 0,
        inconclusive: 0,
        outbreaks: Vec::new(),
        failures: Vec::new(),
    };

    while let Some(joined) = tasks.join_next().await {
        summary.pairs_checked += 1;
        match joined {
            Ok((_, _, Ok(PairOutcome::Quiet))) => {}
            Ok((_, _, Ok(PairOutcome::Inconclusive))) => summary.inconclusive += 1,
            Ok((district, disease, Ok(PairOutcome::Outbreak(outbreak)))) => {
                if let Some(e) = &outbreak.delivery_error {
                    summary.failures.push(PairFailure {
                        district,
                        disease,
                        error: e.clone(),
                    });
                }
                summary.outbreaks.push(outbreak);
            }
            Ok((district, disease, Err(e))) => {
                warn!(%district, %disease, "Pair check failed: {}", e);
                summary.failures.push(PairFailure {
                    district,
                    disease,
                    error: e.to_string(),
                });
            }
            Err(e) => {
                error!("Pair task panicked: {}", e);
                summary.failures.push(PairFailure {
                    district: String::new(),
                    disease: String::new(),
                    error: e.to_string(),
                });
            }
        }
    }

    summary
        .outbreaks
        .sort_by(|a, b| (&a.district, &a.disease).cmp(&(&b.district, &b.disease)));
    summary
        .failures
        .sort_by(|a, b| (&a.district, &a.disease).cmp(&(&b.district, &b.disease)));

    let status = match summary.failures.len() {
        0 => RunStatus::Success,
        n if n as u32 >= summary.pairs_checked => RunStatus::Failed,
        _ => RunStatus::Partial,
    };

    let pool = ctx.pool.clone();
    let (checked, detected, failed) = (
        summary.pairs_checked,
        summary.outbreaks.len() as u32,
        summary.failures.len() as u32,
    );
    if let Err(e) = tokio::task::spawn_blocking(move || finish_run(&pool, run_id, status, checked, detected, failed)).await? {
        error!(%run_id, "Failed to record sweep result: {}", e);
    }

    info!(
        %run_id,
        pairs = checked,
        outbreaks = detected,
        failures = failed,
        "Outbreak sweep finished"
    );
    Ok(summary)
}

enum PairAssessment {
    Inconclusive,
    Quiet,
    Outbreak {
        assessment: Assessment,
        latest: CaseReport,
        recipients: Vec<Subscriber>,
    },
}

/// Analysis and recipient lookup for one pair; no side effects.
async fn assess_pair(
    ctx: &SweepContext,
    district: &str,
    disease: &str,
    as_of: DateTime<Utc>,
) -> Result<PairAssessment, PairError> {
    let pool = ctx.pool.clone();
    let (d, s) = (district.to_string(), disease.to_string());
    let verdict = tokio::task::spawn_blocking(move || {
        OutbreakAnalyzer::new(SqliteReportStore::new(pool)).analyze(&d, &s, as_of)
    })
    .await??;

    let assessment = match verdict {
        OutbreakVerdict::Inconclusive => return Ok(PairAssessment::Inconclusive),
        OutbreakVerdict::Assessed(a) if !a.is_outbreak => return Ok(PairAssessment::Quiet),
        OutbreakVerdict::Assessed(a) => a,
    };

    let pool = ctx.pool.clone();
    let (d, s) = (district.to_string(), disease.to_string());
    let (latest, recipients) = tokio::task::spawn_blocking(move || -> Result<_, StoreError> {
        let latest = SqliteReportStore::new(pool.clone()).latest_for(&d, &s)?;
        let recipients = alert_recipients(&pool, &d)?;
        Ok((latest, recipients))
    })
    .await??;

    Ok(PairAssessment::Outbreak {
        assessment,
        latest: latest.ok_or(PairError::MissingReport)?,
        recipients,
    })
}

/// Analyze one pair and, on an outbreak, alert the district.
async fn check_pair(
    ctx: &SweepContext,
    district: &str,
    disease: &str,
    as_of: DateTime<Utc>,
) -> Result<PairOutcome, PairError> {
    let budget = ctx.pair_timeout;
    let assessed = tokio::time::timeout(budget, assess_pair(ctx, district, disease, as_of))
        .await
        .map_err(|_| PairError::Timeout(budget))??;
    let (assessment, latest, recipients) = match assessed {
        PairAssessment::Inconclusive => return Ok(PairOutcome::Inconclusive),
        PairAssessment::Quiet => return Ok(PairOutcome::Quiet),
        PairAssessment::Outbreak {
            assessment,
            latest,
            recipients,
        } => (assessment, latest, recipients),
    };

    info!(
        %district,
        %disease,
        level = %assessment.alert_level,
        recipients = recipients.len(),
        "Outbreak detected"
    );

    let mut outbreak = DetectedOutbreak {
        district: district.to_string(),
        disease: disease.to_string(),
        alert_level: assessment.alert_level,
        cases_this_week: assessment.current_total,
        outbreak_id: latest.id,
        notified: 0,
        failed: 0,
        delivery_error: None,
    };

    if recipients.is_empty() {
        return Ok(PairOutcome::Outbreak(outbreak));
    }

    let message = format_alert(
        &AlertContext::from_assessment(district, disease, &assessment),
        &ctx.language,
    );
    let meta = AlertMeta {
        report_id: latest.id,
        district: district.to_string(),
        disease: latest.disease.clone(),
        alert_level: assessment.alert_level,
    };

    // The notifier gets its own budget inside `deliver`, so a slow send still
    // leaves a failed record for every recipient.
    match deliver(&ctx.pool, ctx.notifier.as_ref(), &recipients, &message, &meta, budget).await {
        Ok(report) => {
            outbreak.notified = report.sent.len();
            outbreak.failed = report.failed.len();
        }
        Err(DispatchError::Store(e)) => return Err(PairError::Store(e)),
        Err(e) => {
            outbreak.failed = recipients.len();
            outbreak.delivery_error = Some(e.to_string());
        }
    }

    Ok(PairOutcome::Outbreak(outbreak))
}
