//! SQLite connection setup and schema for the pattern and insight tables

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use super::StoreError;

/// How long a writer waits on a lock held by the other store's connection
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a connection to the database file and make sure the schema exists
pub fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path)?;

    // WAL lets readers on one connection proceed while the other writes
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;

    init_schema(&conn)?;
    Ok(conn)
}

/// Open a private in-memory database with the schema applied
pub fn open_in_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        -- One live snapshot per pattern type
        CREATE TABLE IF NOT EXISTS patterns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern_type TEXT NOT NULL UNIQUE,
            pattern_data TEXT NOT NULL,
            confidence REAL NOT NULL,
            created_at TEXT NOT NULL
        );

        -- Generated insights, deduplicated on (text, type)
        CREATE TABLE IF NOT EXISTS insights (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            insight_text TEXT NOT NULL,
            insight_type TEXT NOT NULL,
            confidence REAL NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            validated INTEGER,
            validation_feedback TEXT,
            UNIQUE(insight_text, insight_type)
        );

        CREATE INDEX IF NOT EXISTS idx_patterns_created ON patterns(created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_insights_created ON insights(created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_insights_type ON insights(insight_type);
        "#,
    )?;

    Ok(())
}

/// Fixed-width UTC timestamp, so text ordering matches time ordering
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Confidence is kept in [0, 1]; non-finite values are stored as 0
pub(crate) fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('patterns', 'insights')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("insights.db");
        open_connection(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_timestamps_sort_as_text() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(1);
        assert!(timestamp(earlier) < timestamp(later));
        assert_eq!(parse_timestamp(&timestamp(earlier)), earlier);
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(1.5), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(0.9), 0.9);
    }
}
