//! People who receive district alerts.

use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::{Pool, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub district: String,
    pub is_active: bool,
    pub notify_whatsapp: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscriber {
    pub name: String,
    pub phone: String,
    pub district: String,
    #[serde(default = "default_true")]
    pub notify_whatsapp: bool,
}

fn default_true() -> bool {
    true
}

pub fn add_subscriber(pool: &Pool, s: &NewSubscriber) -> Result<i64, StoreError> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO subscribers (name, phone, district, notify_whatsapp) VALUES (?1, ?2, ?3, ?4)",
        params![s.name.trim(), s.phone.trim(), s.district.trim(), s.notify_whatsapp],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_subscribers(pool: &Pool) -> Result<Vec<Subscriber>, StoreError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, name, phone, district, is_active, notify_whatsapp FROM subscribers ORDER BY id",
    )?;
    let rows = stmt.query_map([], map_subscriber)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

/// Active subscribers in `district` who opted into WhatsApp alerts.
pub fn alert_recipients(pool: &Pool, district: &str) -> Result<Vec<Subscriber>, StoreError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, name, phone, district, is_active, notify_whatsapp FROM subscribers
         WHERE district = ?1 AND is_active = 1 AND notify_whatsapp = 1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![district], map_subscriber)?;
    Ok(rows.collect::<Result<_, _>>()?)
}

pub fn count_active(pool: &Pool) -> Result<i64, StoreError> {
    let conn = pool.get()?;
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM subscribers WHERE is_active = 1",
        [],
        |row| row.get(0),
    )?)
}

pub fn set_active(pool: &Pool, id: i64, active: bool) -> Result<bool, StoreError> {
    let conn = pool.get()?;
    let changed = conn.execute(
        "UPDATE subscribers SET is_active = ?1 WHERE id = ?2",
        params![active, id],
    )?;
    Ok(changed > 0)
}

fn map_subscriber(row: &Row<'_>) -> rusqlite::Result<Subscriber> {
    Ok(Subscriber {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        district: row.get(3)?,
        is_active: row.get(4)?,
        notify_whatsapp: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::open_memory_pool;

    fn sub(name: &str, district: &str, whatsapp: bool) -> NewSubscriber {
        NewSubscriber {
            name: name.into(),
            phone: "+910000000000".into(),
            district: district.into(),
            notify_whatsapp: whatsapp,
        }
    }

    #[test]
    fn test_recipients_filter() {
        let pool = open_memory_pool().unwrap();
        let a = add_subscriber(&pool, &sub("Asha", "Pune", true)).unwrap();
        add_subscriber(&pool, &sub("Ravi", "Pune", false)).unwrap();
        add_subscriber(&pool, &sub("Meena", "Nagpur", true)).unwrap();
        let d = add_subscriber(&pool, &sub("Dev", "Pune", true)).unwrap();
        assert!(set_active(&pool, d, false).unwrap());

        let recipients = alert_recipients(&pool, "Pune").unwrap();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].id, a);

        assert_eq!(list_subscribers(&pool).unwrap().len(), 4);
        assert_eq!(count_active(&pool).unwrap(), 3);
    }

    #[test]
    fn test_set_active_unknown_id() {
        let pool = open_memory_pool().unwrap();
        assert!(!set_active(&pool, 42, false).unwrap());
    }
}
