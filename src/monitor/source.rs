//! Data sources that feed incident batches to the scheduler

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::types::{IncidentRecord, RawIncident};

/// A whole-batch failure. The pass is abandoned and retried after a cooldown.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed batch: {0}")]
    Malformed(String),
}

/// Something that can produce the current batch of incident records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Pull the full current batch
    async fn pull_batch(&self) -> Result<Vec<IncidentRecord>, SourceError>;

    /// Human-readable reference shown in scheduler status
    fn describe(&self) -> String;
}

/// Reads incidents from a JSON array or newline-delimited JSON file
///
/// The file is re-read on every pull so that a replaced export is picked up
/// by the next pass. Entries that are not incident objects are skipped.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl DataSource for JsonFileSource {
    async fn pull_batch(&self) -> Result<Vec<IncidentRecord>, SourceError> {
        if !self.path.exists() {
            return Err(SourceError::Unavailable(format!(
                "{} does not exist",
                self.path.display()
            )));
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let records = parse_incidents(&content)?;
        debug!("Pulled {} records from {}", records.len(), self.path.display());
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

/// Parse a JSON array or NDJSON document into normalized records
///
/// A document that is not JSON at all fails the batch. Entries that are not
/// objects are skipped with a warning; mistyped fields inside an object are
/// defaulted.
pub fn parse_incidents(content: &str) -> Result<Vec<IncidentRecord>, SourceError> {
    let trimmed = content.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let values: Vec<Value> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| SourceError::Malformed(e.to_string()))?
    } else {
        let mut values = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(value) => values.push(value),
                Err(e) => warn!("Skipping line {}: {}", line_no + 1, e),
            }
        }
        if values.is_empty() {
            return Err(SourceError::Malformed("no JSON records found".to_string()));
        }
        values
    };

    let total = values.len();
    let records: Vec<IncidentRecord> = values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<RawIncident>(value) {
            Ok(raw) => Some(IncidentRecord::from(raw)),
            Err(e) => {
                warn!("Skipping record {}: {}", index, e);
                None
            }
        })
        .collect();

    if records.len() < total {
        warn!("Skipped {} of {} malformed records", total - records.len(), total);
    }

    Ok(records)
}

/// In-memory source whose batch can be swapped at runtime
#[derive(Clone, Default)]
pub struct StaticSource {
    records: Arc<RwLock<Vec<IncidentRecord>>>,
    unavailable: Arc<AtomicBool>,
    pulls: Arc<AtomicUsize>,
}

impl StaticSource {
    pub fn new(records: Vec<IncidentRecord>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
            ..Default::default()
        }
    }

    /// Replace the batch returned by later pulls
    pub async fn set_records(&self, records: Vec<IncidentRecord>) {
        *self.records.write().await = records;
    }

    /// Make pulls fail with `SourceError::Unavailable` until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of pulls attempted so far
    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for StaticSource {
    async fn pull_batch(&self) -> Result<Vec<IncidentRecord>, SourceError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("static source marked unavailable".to_string()));
        }
        Ok(self.records.read().await.clone())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
