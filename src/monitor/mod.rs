//! Background monitoring: data sources and the analysis scheduler

pub mod scheduler;
pub mod source;

pub use scheduler::{
    is_due, AnalysisScheduler, PassError, PassReport, SchedulerConfig, SchedulerPhase, SchedulerStatus,
};
pub use source::{parse_incidents, DataSource, JsonFileSource, SourceError, StaticSource};
