//! Persistent store for analysis results
//!
//! Provides:
//! - `PatternStore`: one live snapshot per pattern type, replaced on upsert
//! - `InsightStore`: generated insights deduplicated on (text, type), with a
//!   human validation status that only `validate` changes
//!
//! Each store owns its own SQLite connection behind an async mutex, so writes
//! to one store never wait on the other and no caller sees a half-written row.

pub mod insights;
pub mod patterns;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub use insights::InsightStore;
pub use patterns::PatternStore;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// The current snapshot for one pattern type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSnapshot {
    pub pattern_type: String,
    pub data: Value,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// A stored insight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightRecord {
    /// Store-assigned identity, kept when a duplicate replaces the row
    pub id: i64,
    pub text: String,
    pub insight_type: String,
    pub confidence: f64,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    /// Unset until a reviewer validates the insight
    pub validated: Option<bool>,
    pub validation_feedback: Option<String>,
}

/// Both stores opened against the same database
#[derive(Clone)]
pub struct AnalysisStore {
    pub patterns: PatternStore,
    pub insights: InsightStore,
}

impl AnalysisStore {
    /// Open both stores on the database file at `path`
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let store = Self {
            patterns: PatternStore::open(path).await?,
            insights: InsightStore::open(path).await?,
        };
        info!("Opened analysis store at {}", path.display());
        Ok(store)
    }

    /// Open both stores in memory
    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            patterns: PatternStore::from_connection(sqlite::open_in_memory()?),
            insights: InsightStore::from_connection(sqlite::open_in_memory()?),
        })
    }

    /// Delete every pattern and insight. Returns (patterns, insights) removed.
    pub async fn reset(&self) -> Result<(usize, usize), StoreError> {
        let patterns = self.patterns.clear().await?;
        let insights = self.insights.clear().await?;
        info!("Store reset: removed {} patterns and {} insights", patterns, insights);
        Ok((patterns, insights))
    }
}
