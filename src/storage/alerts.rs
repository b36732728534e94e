//! Per-recipient alert records.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;
use uuid::Uuid;

use super::reports::conversion_error;
use super::{from_db_time, to_db_time, Pool, StoreError};
use crate::detect::AlertLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Whatsapp,
    Sms,
    Both,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Whatsapp => "whatsapp",
            Channel::Sms => "sms",
            Channel::Both => "both",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "whatsapp" => Some(Channel::Whatsapp),
            "sms" => Some(Channel::Sms),
            "both" => Some(Channel::Both),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Delivered => "delivered",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DeliveryStatus::Pending),
            "sent" => Some(DeliveryStatus::Sent),
            "failed" => Some(DeliveryStatus::Failed),
            "delivered" => Some(DeliveryStatus::Delivered),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: Uuid,
    pub subscriber_id: i64,
    pub report_id: i64,
    pub disease: String,
    pub alert_level: AlertLevel,
    pub message: String,
    pub channel: Channel,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl AlertRecord {
    pub fn pending(
        subscriber_id: i64,
        report_id: i64,
        disease: &str,
        alert_level: AlertLevel,
        message: &str,
        channel: Channel,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscriber_id,
            report_id,
            disease: disease.to_string(),
            alert_level,
            message: message.to_string(),
            channel,
            status: DeliveryStatus::Pending,
            created_at: Utc::now(),
            sent_at: None,
        }
    }
}

pub fn insert_alert(pool: &Pool, a: &AlertRecord) -> Result<(), StoreError> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO alerts
            (id, subscriber_id, report_id, disease, alert_level, message, channel, status, created_at, sent_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            a.id.to_string(),
            a.subscriber_id,
            a.report_id,
            a.disease,
            a.alert_level.as_str(),
            a.message,
            a.channel.as_str(),
            a.status.as_str(),
            to_db_time(a.created_at),
            a.sent_at.map(to_db_time),
        ],
    )?;
    Ok(())
}

pub fn list_recent(pool: &Pool, limit: usize) -> Result<Vec<AlertRecord>, StoreError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, subscriber_id, report_id, disease, alert_level, message, channel, status, created_at, sent_at
         FROM alerts ORDER BY created_at DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], map_alert)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

fn map_alert(row: &Row<'_>) -> rusqlite::Result<AlertRecord> {
    let id: String = row.get(0)?;
    let level: String = row.get(4)?;
    let channel: String = row.get(6)?;
    let status: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let sent_at: Option<String> = row.get(9)?;

    let time = |idx: usize, s: &str| from_db_time(s).map_err(|e| conversion_error(idx, e.to_string()));

    Ok(AlertRecord {
        id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
        subscriber_id: row.get(1)?,
        report_id: row.get(2)?,
        disease: row.get(3)?,
        alert_level: level.parse::<AlertLevel>().map_err(|e| conversion_error(4, e))?,
        message: row.get(5)?,
        channel: Channel::parse(&channel)
            .ok_or_else(|| conversion_error(6, format!("unknown channel '{}'", channel)))?,
        status: DeliveryStatus::parse(&status)
            .ok_or_else(|| conversion_error(7, format!("unknown status '{}'", status)))?,
        created_at: time(8, &created_at)?,
        sent_at: sent_at.as_deref().map(|s| time(9, s)).transpose()?,
    })
}
