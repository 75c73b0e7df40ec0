//! Generated insights with reviewer validation
//!
//! Appending an insight whose (text, type) pair already exists replaces the
//! stored row in place: the id is kept, while confidence, metadata and
//! created_at take the new values and the validation status is reset to
//! unset. A regenerated insight is a fresh observation and has to be
//! reviewed again.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::sqlite::{clamp_confidence, open_connection, parse_timestamp, timestamp};
use super::{InsightRecord, StoreError};

const SELECT_COLUMNS: &str = "SELECT id, insight_text, insight_type, confidence, metadata, created_at, validated, validation_feedback FROM insights";

/// Deduplicated insight log
#[derive(Clone)]
pub struct InsightStore {
    conn: Arc<Mutex<Connection>>,
}

impl InsightStore {
    /// Open the insight table in the database at `path`
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = open_connection(path.as_ref())?;
        Ok(Self::from_connection(conn))
    }

    pub(crate) fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Insert an insight, or replace the one with the same text and type
    ///
    /// Returns the id of the stored row.
    pub async fn append(
        &self,
        text: &str,
        insight_type: &str,
        confidence: f64,
        metadata: &Value,
    ) -> Result<i64, StoreError> {
        let metadata_json = serde_json::to_string(metadata)?;
        let conn = self.conn.lock().await;

        let id: i64 = conn.query_row(
            r#"INSERT INTO insights
                   (insight_text, insight_type, confidence, metadata, created_at, validated, validation_feedback)
               VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL)
               ON CONFLICT(insight_text, insight_type) DO UPDATE SET
                   confidence = excluded.confidence,
                   metadata = excluded.metadata,
                   created_at = excluded.created_at,
                   validated = NULL,
                   validation_feedback = NULL
               RETURNING id"#,
            params![
                text,
                insight_type,
                clamp_confidence(confidence),
                metadata_json,
                timestamp(Utc::now()),
            ],
            |row| row.get(0),
        )?;

        debug!("Stored {} insight {}", insight_type, id);
        Ok(id)
    }

    /// Newest insights first, optionally restricted to one type
    pub async fn list(
        &self,
        limit: usize,
        insight_type: Option<&str>,
    ) -> Result<Vec<InsightRecord>, StoreError> {
        let conn = self.conn.lock().await;
        let limit = limit as i64;

        let records = match insight_type {
            Some(insight_type) => {
                let mut stmt = conn.prepare_cached(&format!(
                    "{} WHERE insight_type = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
                    SELECT_COLUMNS
                ))?;
                let rows = stmt.query_map(params![insight_type, limit], row_to_insight)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare_cached(&format!(
                    "{} ORDER BY created_at DESC, id DESC LIMIT ?1",
                    SELECT_COLUMNS
                ))?;
                let rows = stmt.query_map(params![limit], row_to_insight)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(records)
    }

    /// Load a single insight by id
    pub async fn get(&self, id: i64) -> Result<InsightRecord, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!("{} WHERE id = ?1", SELECT_COLUMNS))?;

        stmt.query_row(params![id], row_to_insight)
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("insight {}", id)))
    }

    /// Record a reviewer's verdict on an insight
    ///
    /// Only the validation fields change. Unknown ids fail with `NotFound`.
    pub async fn validate(
        &self,
        id: i64,
        validated: bool,
        feedback: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;

        let updated = conn.execute(
            "UPDATE insights SET validated = ?1, validation_feedback = ?2 WHERE id = ?3",
            params![validated, feedback, id],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound(format!("insight {}", id)));
        }

        info!("Insight {} marked {}", id, if validated { "valid" } else { "invalid" });
        Ok(())
    }

    /// Number of stored insights
    pub async fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM insights", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Remove every insight, returning how many were deleted
    pub async fn clear(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().await;
        Ok(conn.execute("DELETE FROM insights", [])?)
    }
}

fn row_to_insight(row: &rusqlite::Row<'_>) -> rusqlite::Result<InsightRecord> {
    let id: i64 = row.get(0)?;
    let metadata_json: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    let metadata = serde_json::from_str(&metadata_json).unwrap_or_else(|e| {
        warn!("Insight {} metadata is not valid JSON: {}", id, e);
        Value::Null
    });

    Ok(InsightRecord {
        id,
        text: row.get(1)?,
        insight_type: row.get(2)?,
        confidence: row.get(3)?,
        metadata,
        created_at: parse_timestamp(&created_at),
        validated: row.get(6)?,
        validation_feedback: row.get(7)?,
    })
}
