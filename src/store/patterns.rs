//! Pattern snapshots keyed by pattern type

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::sqlite::{clamp_confidence, open_connection, parse_timestamp, timestamp};
use super::{PatternSnapshot, StoreError};

/// Upsert-only table with one row per pattern type
#[derive(Clone)]
pub struct PatternStore {
    conn: Arc<Mutex<Connection>>,
}

impl PatternStore {
    /// Open the pattern table in the database at `path`
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = open_connection(path.as_ref())?;
        Ok(Self::from_connection(conn))
    }

    pub(crate) fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Replace the snapshot for `pattern_type` with `data`
    ///
    /// The previous data is discarded, never merged.
    pub async fn upsert<T: Serialize + ?Sized>(
        &self,
        pattern_type: &str,
        data: &T,
        confidence: f64,
    ) -> Result<(), StoreError> {
        let data_json = serde_json::to_string(data)?;
        let conn = self.conn.lock().await;

        conn.execute(
            r#"INSERT INTO patterns (pattern_type, pattern_data, confidence, created_at)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(pattern_type) DO UPDATE SET
                   pattern_data = excluded.pattern_data,
                   confidence = excluded.confidence,
                   created_at = excluded.created_at"#,
            params![
                pattern_type,
                data_json,
                clamp_confidence(confidence),
                timestamp(Utc::now()),
            ],
        )?;

        debug!("Upserted pattern {}", pattern_type);
        Ok(())
    }

    /// Current snapshot for `pattern_type`
    pub async fn get(&self, pattern_type: &str) -> Result<PatternSnapshot, StoreError> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT pattern_type, pattern_data, confidence, created_at
             FROM patterns WHERE pattern_type = ?1",
        )?;

        stmt.query_row(params![pattern_type], row_to_snapshot)
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("pattern '{}'", pattern_type)))
    }

    /// Snapshots, most recently written first
    pub async fn list(
        &self,
        pattern_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PatternSnapshot>, StoreError> {
        let conn = self.conn.lock().await;
        let limit = limit as i64;

        let snapshots = match pattern_type {
            Some(pattern_type) => {
                let mut stmt = conn.prepare_cached(
                    "SELECT pattern_type, pattern_data, confidence, created_at
                     FROM patterns
                     WHERE pattern_type = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![pattern_type, limit], row_to_snapshot)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare_cached(
                    "SELECT pattern_type, pattern_data, confidence, created_at
                     FROM patterns
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit], row_to_snapshot)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(snapshots)
    }

    /// Number of stored snapshots
    pub async fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM patterns", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Remove every snapshot, returning how many were deleted
    pub async fn clear(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().await;
        Ok(conn.execute("DELETE FROM patterns", [])?)
    }
}

fn row_to_snapshot(row: &rusqlite::Row<'_>) -> rusqlite::Result<PatternSnapshot> {
    let pattern_type: String = row.get(0)?;
    let data_json: String = row.get(1)?;
    let created_at: String = row.get(3)?;

    let data = serde_json::from_str(&data_json).unwrap_or_else(|e| {
        warn!("Stored {} pattern data is not valid JSON: {}", pattern_type, e);
        serde_json::Value::Null
    });

    Ok(PatternSnapshot {
        pattern_type,
        data,
        confidence: row.get(2)?,
        created_at: parse_timestamp(&created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::open_in_memory;
    use serde_json::json;
    use std::time::Duration;

    fn store() -> PatternStore {
        PatternStore::from_connection(open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_upsert_replaces_snapshot() {
        let store = store();
        store
            .upsert("hourly", &json!({"counts": [1, 2], "peak_hour": 1}), 0.5)
            .await
            .unwrap();
        store.upsert("hourly", &json!({"peak_hour": 7}), 1.0).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let snapshot = store.get("hourly").await.unwrap();
        assert_eq!(snapshot.data, json!({"peak_hour": 7}));
        assert_eq!(snapshot.confidence, 1.0);
        assert!(snapshot.data.get("counts").is_none());
    }

    #[tokio::test]
    async fn test_get_unknown_type() {
        let store = store();
        let err = store.get("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_most_recent_first() {
        let store = store();
        store.upsert("hourly", &json!(1), 1.0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.upsert("locations", &json!(2), 0.9).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.upsert("hourly", &json!(3), 1.0).await.unwrap();

        let all = store.list(None, 10).await.unwrap();
        let types: Vec<_> = all.iter().map(|p| p.pattern_type.as_str()).collect();
        assert_eq!(types, vec!["hourly", "locations"]);

        let limited = store.list(None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);

        let filtered = store.list(Some("locations"), 10).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].data, json!(2));
    }

    #[tokio::test]
    async fn test_confidence_is_clamped() {
        let store = store();
        store.upsert("hourly", &json!({}), 3.0).await.unwrap();
        assert_eq!(store.get("hourly").await.unwrap().confidence, 1.0);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_leave_one_row() {
        let store = store();
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.upsert("hourly", &json!({ "writer": i }), 1.0).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.count().await.unwrap(), 1);
        let snapshot = store.get("hourly").await.unwrap();
        assert!(snapshot.data["writer"].is_u64());
    }

    #[tokio::test]
    async fn test_corrupt_data_reads_as_null() {
        let store = store();
        store.upsert("locations", &json!({"top_label": "X"}), 0.9).await.unwrap();
        store
            .conn
            .lock()
            .await
            .execute(
                "UPDATE patterns SET pattern_data = '{not json' WHERE pattern_type = 'locations'",
                [],
            )
            .unwrap();

        let snapshot = store.get("locations").await.unwrap();
        assert!(snapshot.data.is_null());
        assert_eq!(snapshot.confidence, 0.9);
        assert_eq!(store.list(None, 10).await.unwrap().len(), 1);
    }
}
