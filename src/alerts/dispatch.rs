//! Bulk alert delivery.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::detect::AlertLevel;
use crate::storage::alerts::{insert_alert, AlertRecord, Channel, DeliveryStatus};
use crate::storage::subscribers::Subscriber;
use crate::storage::{Pool, StoreError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("notifier transport error: {0}")]
    Transport(String),

    #[error("notifier rejected request: HTTP {0}")]
    Rejected(u16),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("notifier timed out after {0:?}")]
    Timeout(Duration),
}

/// Links a broadcast to the report that triggered it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMeta {
    pub report_id: i64,
    pub district: String,
    pub disease: String,
    pub alert_level: AlertLevel,
}

/// Subscriber ids by outcome.
#[derive(Debug, Default, Clone, Serialize)]
pub struct DispatchReport {
    pub sent: Vec<i64>,
    pub failed: Vec<i64>,
}

/// Bulk messaging channel.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }

    /// Send `message` to every recipient.
    async fn send_bulk(
        &self,
        recipients: &[Subscriber],
        message: &str,
        meta: &AlertMeta,
    ) -> Result<DispatchReport, DispatchError>;
}

/// Writes each delivery to the log. Used when no gateway is configured.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send_bulk(
        &self,
        recipients: &[Subscriber],
        message: &str,
        meta: &AlertMeta,
    ) -> Result<DispatchReport, DispatchError> {
        for r in recipients {
            info!(
                subscriber = r.id,
                phone = %r.phone,
                district = %meta.district,
                disease = %meta.disease,
                level = %meta.alert_level,
                chars = message.chars().count(),
                "Alert delivered (log channel)"
            );
        }
        Ok(DispatchReport {
            sent: recipients.iter().map(|r| r.id).collect(),
            failed: Vec::new(),
        })
    }
}

/// Posts one JSON document per broadcast to a messaging gateway.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send_bulk(
        &self,
        recipients: &[Subscriber],
        message: &str,
        meta: &AlertMeta,
    ) -> Result<DispatchReport, DispatchError> {
        let body = json!({
            "recipients": recipients
                .iter()
                .map(|r| json!({ "id": r.id, "name": r.name, "phone": r.phone }))
                .collect::<Vec<_>>(),
            "message": message,
            "meta": meta,
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected(status.as_u16()));
        }

        Ok(DispatchReport {
            sent: recipients.iter().map(|r| r.id).collect(),
            failed: Vec::new(),
        })
    }
}

/// Send through `notifier` and store one alert record per recipient.
///
/// A notifier error, or a send that outlives `budget`, marks every recipient
/// failed; the records are still written before the error is returned.
pub async fn deliver(
    pool: &Pool,
    notifier: &dyn Notifier,
    recipients: &[Subscriber],
    message: &str,
    meta: &AlertMeta,
    budget: Duration,
) -> Result<DispatchReport, DispatchError> {
    if recipients.is_empty() {
        return Ok(DispatchReport::default());
    }

    let outcome = match tokio::time::timeout(budget, notifier.send_bulk(recipients, message, meta)).await {
        Ok(r) => r,
        Err(_) => Err(DispatchError::Timeout(budget)),
    };
    let report = match &outcome {
        Ok(report) => report.clone(),
        Err(e) => {
            warn!(district = %meta.district, disease = %meta.disease, "Bulk send failed: {}", e);
            DispatchReport {
                sent: Vec::new(),
                failed: recipients.iter().map(|r| r.id).collect(),
            }
        }
    };

    let now = Utc::now();
    let records: Vec<AlertRecord> = recipients
        .iter()
        .map(|r| {
            let mut rec = AlertRecord::pending(
                r.id,
                meta.report_id,
                &meta.disease,
                meta.alert_level,
                message,
                notifier.channel(),
            );
            if report.sent.contains(&r.id) {
                rec.status = DeliveryStatus::Sent;
                rec.sent_at = Some(now);
            } else if report.failed.contains(&r.id) {
                rec.status = DeliveryStatus::Failed;
            }
            rec
        })
        .collect();

    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
        for rec in &records {
            insert_alert(&pool, rec)?;
        }
        Ok(())
    })
    .await??;

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::alerts::list_recent;
    use crate::storage::open_memory_pool;
    use crate::storage::reports::{NewCaseReport, SqliteReportStore};
    use crate::storage::subscribers::{add_subscriber, alert_recipients, NewSubscriber};
    use axum::{extract::State, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    const BUDGET: Duration = Duration::from_secs(5);

    struct DownNotifier;

    #[async_trait::async_trait]
    impl Notifier for DownNotifier {
        async fn send_bulk(
            &self,
            _: &[Subscriber],
            _: &str,
            _: &AlertMeta,
        ) -> Result<DispatchReport, DispatchError> {
            Err(DispatchError::Transport("gateway unreachable".into()))
        }
    }

    fn seed(pool: &Pool) -> (Vec<Subscriber>, AlertMeta) {
        let report_id = SqliteReportStore::new(pool.clone())
            .insert(&NewCaseReport {
                state: "Assam".into(),
                district: "Jorhat".into(),
                disease: "Malaria".into(),
                cases_count: 30,
                report_date: Utc::now(),
                source_url: None,
                alert_text: None,
            })
            .unwrap();
        for name in ["Anil", "Bina"] {
            add_subscriber(
                pool,
                &NewSubscriber {
                    name: name.into(),
                    phone: "+912222222222".into(),
                    district: "Jorhat".into(),
                    notify_whatsapp: true,
                },
            )
            .unwrap();
        }
        let meta = AlertMeta {
            report_id,
            district: "Jorhat".into(),
            disease: "Malaria".into(),
            alert_level: AlertLevel::High,
        };
        (alert_recipients(pool, "Jorhat").unwrap(), meta)
    }

    #[tokio::test]
    async fn test_deliver_records_sent() {
        let pool = open_memory_pool().unwrap();
        let (recipients, meta) = seed(&pool);

        let report = deliver(&pool, &LogNotifier, &recipients, "msg", &meta, BUDGET).await.unwrap();
        assert_eq!(report.sent.len(), 2);

        let records = list_recent(&pool, 10).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status == DeliveryStatus::Sent));
        assert!(records.iter().all(|r| r.report_id == meta.report_id));
    }

    #[tokio::test]
    async fn test_deliver_records_failures() {
        let pool = open_memory_pool().unwrap();
        let (recipients, meta) = seed(&pool);

        let err = deliver(&pool, &DownNotifier, &recipients, "msg", &meta, BUDGET).await;
        assert!(matches!(err, Err(DispatchError::Transport(_))));

        let records = list_recent(&pool, 10).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status == DeliveryStatus::Failed));
    }

    struct SlowNotifier;

    #[async_trait::async_trait]
    impl Notifier for SlowNotifier {
        async fn send_bulk(
            &self,
            _: &[Subscriber],
            _: &str,
            _: &AlertMeta,
        ) -> Result<DispatchReport, DispatchError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(DispatchReport::default())
        }
    }

    #[tokio::test]
    async fn test_deliver_records_timed_out_send() {
        let pool = open_memory_pool().unwrap();
        let (recipients, meta) = seed(&pool);

        let err = deliver(&pool, &SlowNotifier, &recipients, "msg", &meta, Duration::from_millis(100)).await;
        assert!(matches!(err, Err(DispatchError::Timeout(_))));

        let records = list_recent(&pool, 10).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status == DeliveryStatus::Failed));
    }

    #[tokio::test]
    async fn test_deliver_without_recipients_is_noop() {
        let pool = open_memory_pool().unwrap();
        let (_, meta) = seed(&pool);
        let report = deliver(&pool, &DownNotifier, &[], "msg", &meta, BUDGET).await.unwrap();
        assert!(report.sent.is_empty() && report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_posts_broadcast() {
        type Seen = Arc<Mutex<Vec<serde_json::Value>>>;

        async fn capture(State(seen): State<Seen>, Json(body): Json<serde_json::Value>) -> &'static str {
            seen.lock().unwrap().push(body);
            "ok"
        }

        let seen: Seen = Arc::default();
        let app = Router::new().route("/hook", post(capture)).with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let pool = open_memory_pool().unwrap();
        let (recipients, meta) = seed(&pool);
        let notifier =
            WebhookNotifier::new(&format!("http://{}/hook", addr), Duration::from_secs(5)).unwrap();

        let report = notifier.send_bulk(&recipients, "hello", &meta).await.unwrap();
        assert_eq!(report.sent.len(), 2);

        let bodies = seen.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["message"], "hello");
        assert_eq!(bodies[0]["meta"]["alertLevel"], "HIGH");
        assert_eq!(bodies[0]["recipients"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_webhook_rejection() {
        let app = Router::new().route(
            "/hook",
            post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let pool = open_memory_pool().unwrap();
        let (recipients, meta) = seed(&pool);
        let notifier =
            WebhookNotifier::new(&format!("http://{}/hook", addr), Duration::from_secs(5)).unwrap();

        let err = notifier.send_bulk(&recipients, "hello", &meta).await.unwrap_err();
        assert!(matches!(err, DispatchError::Rejected(503)));
    }
}
