//! Configuration management
//!
//! Scheduler timing, store location, data source and aggregation limits,
//! loaded from `config.toml` in the platform config directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::AggregatorConfig;
use crate::monitor::SchedulerConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Analysis loop timing
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Database location
    #[serde(default)]
    pub store: StoreSettings,
    /// Incident data source
    #[serde(default)]
    pub source: SourceSettings,
    /// Aggregation limits
    #[serde(default)]
    pub analysis: AnalysisSettings,
}

/// Scheduler timing in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Minimum time between successful passes
    #[serde(default = "default_analysis_interval")]
    pub analysis_interval_secs: u64,
    /// How often the loop checks whether a pass is due
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Cooldown after the first failed pass
    #[serde(default = "default_failure_cooldown")]
    pub failure_cooldown_secs: u64,
    /// Cap on the growing failure cooldown
    #[serde(default = "default_max_cooldown")]
    pub max_cooldown_secs: u64,
}

fn default_analysis_interval() -> u64 { 300 }
fn default_poll_interval() -> u64 { 60 }
fn default_failure_cooldown() -> u64 { 120 }
fn default_max_cooldown() -> u64 { 1800 }

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            analysis_interval_secs: default_analysis_interval(),
            poll_interval_secs: default_poll_interval(),
            failure_cooldown_secs: default_failure_cooldown(),
            max_cooldown_secs: default_max_cooldown(),
        }
    }
}

impl SchedulerSettings {
    /// A retry can only happen on a poll tick, so the cooldown never drops below one
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        let poll = self.poll_interval_secs.max(1);
        let failure_cooldown = self.failure_cooldown_secs.max(poll);
        SchedulerConfig {
            analysis_interval: Duration::from_secs(self.analysis_interval_secs),
            poll_interval: Duration::from_secs(poll),
            failure_cooldown: Duration::from_secs(failure_cooldown),
            max_cooldown: Duration::from_secs(self.max_cooldown_secs.max(failure_cooldown)),
        }
    }
}

/// Where the SQLite database lives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Defaults to `insights.db` in the data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

impl StoreSettings {
    /// Configured path, or the default in the data directory
    pub fn resolve_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("insights.db")),
        }
    }
}

/// Incident export to analyze
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// JSON array or newline-delimited JSON file
    #[serde(default = "default_source_path")]
    pub path: PathBuf,
}

fn default_source_path() -> PathBuf {
    PathBuf::from("incidents.json")
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            path: default_source_path(),
        }
    }
}

/// How many labels the ranked patterns keep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default = "default_top_n_stored")]
    pub top_n_stored: usize,
    #[serde(default = "default_top_n_insights")]
    pub top_n_insights: usize,
}

fn default_top_n_stored() -> usize { 10 }
fn default_top_n_insights() -> usize { 5 }

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            top_n_stored: default_top_n_stored(),
            top_n_insights: default_top_n_insights(),
        }
    }
}

impl AnalysisSettings {
    pub fn to_aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            top_n_stored: self.top_n_stored,
            top_n_insights: self.top_n_insights,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from `path`, writing defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create config directory")?;
            }
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "incident-insights", "incident-insights")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "incident-insights", "incident-insights")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}
