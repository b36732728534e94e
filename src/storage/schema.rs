//! Database schema and migrations.

use rusqlite::Connection;

/// Ordered schema migrations. Each runs once; its number is recorded in
/// `schema_version`.
const MIGRATIONS: &[(i64, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS case_reports (
        id INTEGER PRIMARY KEY,
        state TEXT NOT NULL,
        district TEXT NOT NULL,
        disease TEXT NOT NULL,
        cases_count INTEGER NOT NULL CHECK (cases_count >= 0),
        report_date TEXT NOT NULL,
        alert_level TEXT NOT NULL DEFAULT 'LOW',
        is_active INTEGER NOT NULL DEFAULT 1,
        source_url TEXT,
        alert_text TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS subscribers (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        phone TEXT NOT NULL,
        district TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        notify_whatsapp INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS alerts (
        id TEXT PRIMARY KEY,
        subscriber_id INTEGER NOT NULL,
        report_id INTEGER NOT NULL,
        disease TEXT NOT NULL,
        alert_level TEXT NOT NULL,
        message TEXT NOT NULL,
        channel TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        created_at TEXT NOT NULL,
        sent_at TEXT,
        FOREIGN KEY (subscriber_id) REFERENCES subscribers(id),
        FOREIGN KEY (report_id) REFERENCES case_reports(id)
    );

    CREATE TABLE IF NOT EXISTS sweep_runs (
        id TEXT PRIMARY KEY,
        trigger TEXT NOT NULL,
        status TEXT NOT NULL,
        pairs_checked INTEGER NOT NULL DEFAULT 0,
        outbreaks_detected INTEGER NOT NULL DEFAULT 0,
        failures INTEGER NOT NULL DEFAULT 0,
        started_at TEXT NOT NULL,
        finished_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_reports_pair_date ON case_reports(district, disease, report_date);
    CREATE INDEX IF NOT EXISTS idx_reports_active_date ON case_reports(is_active, report_date);
    CREATE INDEX IF NOT EXISTS idx_subscribers_district ON subscribers(district);
    CREATE INDEX IF NOT EXISTS idx_alerts_subscriber ON alerts(subscriber_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_sweep_runs_started ON sweep_runs(started_at);",
)];

/// Run all pending migrations.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = current_version(conn)?;
    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
        tx.commit()?;
        tracing::info!(version, "Applied schema migration");
    }

    Ok(())
}

/// Highest applied migration, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        for table in ["case_reports", "subscribers", "alerts", "sweep_runs"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0, "table {}", table);
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap(); // Should not error

        let latest = MIGRATIONS.last().map(|(v, _)| *v).unwrap();
        assert_eq!(current_version(&conn).unwrap(), latest);
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_negative_counts_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let res = conn.execute(
            "INSERT INTO case_reports (state, district, disease, cases_count, report_date)
             VALUES ('S', 'D', 'Dengue', -1, '2026-01-01T00:00:00.000Z')",
            [],
        );
        assert!(res.is_err());
    }
}
