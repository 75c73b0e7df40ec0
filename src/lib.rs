//! Incident Insights - periodic incident analysis library
//!
//! Pulls batches of incident records from a data source, derives temporal,
//! categorical and location patterns, generates short insights and keeps
//! both in a SQLite store:
//! - `analysis`: pure aggregation over a record batch
//! - `store`: pattern snapshots (upsert by type) and deduplicated insights
//! - `monitor`: data sources and the background analysis scheduler
//! - `query`: keyword-routed answers from stored patterns
//!
//! # Example
//!
//! ```ignore
//! use incident_insights::{Aggregator, AnalysisScheduler, AnalysisStore, JsonFileSource, SchedulerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = AnalysisStore::open("insights.db").await?;
//!     let scheduler = AnalysisScheduler::new(
//!         SchedulerConfig::default(),
//!         Aggregator::default(),
//!         Arc::new(JsonFileSource::new("incidents.json")),
//!         store,
//!     );
//!     scheduler.start().await;
//!     tokio::signal::ctrl_c().await?;
//!     scheduler.stop().await;
//!     Ok(())
//! }
//! ```

// Core modules
pub mod types;
pub mod analysis;
pub mod store;
pub mod monitor;
pub mod query;

// Application modules
pub mod config;
pub mod cli;

// Re-export commonly used types for convenience
pub use types::{IncidentRecord, RawIncident};

pub use analysis::{
    Aggregator,
    AggregatorConfig,
    AnalysisReport,
    PatternData,
};

pub use store::{
    AnalysisStore,
    InsightRecord,
    InsightStore,
    PatternSnapshot,
    PatternStore,
    StoreError,
};

pub use monitor::{
    AnalysisScheduler,
    DataSource,
    JsonFileSource,
    PassError,
    PassReport,
    SchedulerConfig,
    SchedulerPhase,
    SchedulerStatus,
    SourceError,
    StaticSource,
};

pub use query::QueryEngine;

pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Incident Analysis Library", NAME, VERSION)
}
