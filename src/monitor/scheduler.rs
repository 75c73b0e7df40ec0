//! Analysis scheduler - periodic pull, aggregate and persist
//!
//! The scheduler runs as a single background task. Every poll tick it checks
//! whether a full analysis pass is due; passes pull the current batch from the
//! data source, run the aggregator and write the results to the stores.
//!
//! Phases:
//! - `Idle`: waiting for the next poll tick
//! - `Running`: a pass is in flight
//! - `Backoff`: the last pass failed, waiting out the failure cooldown
//! - `Stopped`: no background task
//!
//! A failed pass never ends the loop. `last_analysis_at` only moves forward
//! when a pass pulled its batch and wrote every pattern and insight, so a
//! failed pass is retried as soon as the cooldown expires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::source::{DataSource, SourceError};
use crate::analysis::Aggregator;
use crate::store::AnalysisStore;

/// Scheduler timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Minimum time between successful passes
    pub analysis_interval: Duration,
    /// How often the loop wakes to check whether a pass is due
    pub poll_interval: Duration,
    /// Sleep after the first failed pass, doubled on each further failure
    pub failure_cooldown: Duration,
    /// Upper bound on the failure cooldown
    pub max_cooldown: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            analysis_interval: Duration::from_secs(300),
            poll_interval: Duration::from_secs(60),
            failure_cooldown: Duration::from_secs(120),
            max_cooldown: Duration::from_secs(1800),
        }
    }
}

impl SchedulerConfig {
    /// Cooldown after `failures` consecutive failed passes
    pub fn backoff_duration(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.failure_cooldown
            .checked_mul(factor)
            .unwrap_or(self.max_cooldown)
            .min(self.max_cooldown)
    }
}

/// Where the scheduler loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerPhase {
    Idle,
    Running,
    Backoff,
    Stopped,
}

impl std::fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerPhase::Idle => write!(f, "Idle"),
            SchedulerPhase::Running => write!(f, "Running"),
            SchedulerPhase::Backoff => write!(f, "Backoff"),
            SchedulerPhase::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub phase: SchedulerPhase,
    pub last_analysis_at: Option<DateTime<Utc>>,
    pub data_source: String,
    pub passes_completed: u64,
    pub passes_failed: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

/// Why a pass failed
#[derive(Debug, Error)]
pub enum PassError {
    #[error("data source failed: {0}")]
    Source(#[from] SourceError),

    #[error("{failed} of {attempted} store writes failed")]
    Store { failed: usize, attempted: usize },
}

/// Summary of a successful pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub pass_id: Uuid,
    pub records: usize,
    pub patterns_written: usize,
    pub insights_written: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Whether a pass is due at `now`
pub fn is_due(last_analysis_at: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> bool {
    match last_analysis_at {
        None => true,
        // A last run in the future (clock stepped back) is treated as not due
        Some(last) => (now - last)
            .to_std()
            .map(|elapsed| elapsed >= interval)
            .unwrap_or(false),
    }
}

#[derive(Debug)]
struct SchedulerState {
    phase: SchedulerPhase,
    looping: bool,
    last_analysis_at: Option<DateTime<Utc>>,
    passes_completed: u64,
    passes_failed: u64,
    consecutive_failures: u32,
    last_error: Option<String>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            phase: SchedulerPhase::Stopped,
            looping: false,
            last_analysis_at: None,
            passes_completed: 0,
            passes_failed: 0,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

/// Everything the background task shares with the handle
struct PassRunner {
    config: SchedulerConfig,
    aggregator: Aggregator,
    source: Arc<dyn DataSource>,
    store: AnalysisStore,
    state: RwLock<SchedulerState>,
    /// Serializes passes from the loop and from `run_pass_now`
    pass_lock: Mutex<()>,
}

impl PassRunner {
    async fn run_pass(&self) -> Result<PassReport, PassError> {
        let _pass = self.pass_lock.lock().await;
        let pass_id = Uuid::new_v4();
        let started_at = Utc::now();

        self.state.write().await.phase = SchedulerPhase::Running;
        info!("Analysis pass {} started", pass_id);

        let result = self.execute(pass_id, started_at).await;

        let mut state = self.state.write().await;
        match &result {
            Ok(report) => {
                state.last_analysis_at = Some(report.finished_at);
                state.passes_completed += 1;
                state.consecutive_failures = 0;
                state.last_error = None;
                state.phase = if state.looping { SchedulerPhase::Idle } else { SchedulerPhase::Stopped };
                info!(
                    "Analysis pass {} complete: {} records, {} patterns, {} insights",
                    pass_id, report.records, report.patterns_written, report.insights_written
                );
            }
            Err(e) => {
                state.passes_failed += 1;
                state.consecutive_failures += 1;
                state.last_error = Some(e.to_string());
                state.phase = if state.looping { SchedulerPhase::Backoff } else { SchedulerPhase::Stopped };
                error!("Analysis pass {} failed: {}", pass_id, e);
            }
        }

        result
    }

    async fn execute(&self, pass_id: Uuid, started_at: DateTime<Utc>) -> Result<PassReport, PassError> {
        let records = self.source.pull_batch().await?;
        let report = self.aggregator.analyze(&records);

        let attempted = report.patterns.len() + report.insights.len();
        let mut patterns_written = 0;
        let mut insights_written = 0;

        for pattern in &report.patterns {
            match self
                .store
                .patterns
                .upsert(&pattern.pattern_type, &pattern.data, pattern.confidence)
                .await
            {
                Ok(()) => patterns_written += 1,
                Err(e) => error!("Pass {}: failed to store pattern {}: {}", pass_id, pattern.pattern_type, e),
            }
        }

        for insight in &report.insights {
            match self
                .store
                .insights
                .append(&insight.text, &insight.insight_type, insight.confidence, &insight.metadata)
                .await
            {
                Ok(_) => insights_written += 1,
                Err(e) => error!("Pass {}: failed to store insight '{}': {}", pass_id, insight.text, e),
            }
        }

        let failed = attempted - patterns_written - insights_written;
        if failed > 0 {
            return Err(PassError::Store { failed, attempted });
        }

        Ok(PassReport {
            pass_id,
            records: report.records,
            patterns_written,
            insights_written,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// How long to sleep before the next loop iteration
    async fn next_sleep(&self) -> Duration {
        let state = self.state.read().await;
        if state.consecutive_failures > 0 {
            self.config.backoff_duration(state.consecutive_failures)
        } else {
            self.config.poll_interval
        }
    }
}

/// Owns the background analysis task
pub struct AnalysisScheduler {
    runner: Arc<PassRunner>,
    shutdown_tx: broadcast::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AnalysisScheduler {
    pub fn new(
        config: SchedulerConfig,
        aggregator: Aggregator,
        source: Arc<dyn DataSource>,
        store: AnalysisStore,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            runner: Arc::new(PassRunner {
                config,
                aggregator,
                source,
                store,
                state: RwLock::new(SchedulerState::default()),
                pass_lock: Mutex::new(()),
            }),
            shutdown_tx,
            handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.runner.config
    }

    pub fn store(&self) -> &AnalysisStore {
        &self.runner.store
    }

    /// Start the background loop. Returns false if it was already running.
    pub async fn start(&self) -> bool {
        let mut handle = self.handle.lock().await;
        if let Some(existing) = &*handle {
            if !existing.is_finished() {
                warn!("Scheduler already running");
                return false;
            }
        }

        {
            let mut state = self.runner.state.write().await;
            state.looping = true;
            state.phase = SchedulerPhase::Idle;
        }

        let shutdown_rx = self.shutdown_tx.subscribe();
        let runner = self.runner.clone();
        *handle = Some(tokio::spawn(run_loop(runner, shutdown_rx)));

        info!(
            "Scheduler started (analysis every {}s, poll every {}s, source {})",
            self.runner.config.analysis_interval.as_secs(),
            self.runner.config.poll_interval.as_secs(),
            self.runner.source.describe()
        );
        true
    }

    /// Signal the loop to exit and wait for it
    ///
    /// An in-flight pass is allowed to finish. Calling stop on a stopped
    /// scheduler does nothing.
    pub async fn stop(&self) {
        let handle = self.handle.lock().await.take();
        let Some(handle) = handle else {
            debug!("Scheduler not running");
            return;
        };

        // No receiver means the loop has already exited
        let _ = self.shutdown_tx.send(());
        if let Err(e) = handle.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }

        let mut state = self.runner.state.write().await;
        state.looping = false;
        state.phase = SchedulerPhase::Stopped;
        info!("Scheduler stopped");
    }

    /// Run one pass immediately, outside the poll schedule
    pub async fn run_pass_now(&self) -> Result<PassReport, PassError> {
        self.runner.run_pass().await
    }

    /// Snapshot of the scheduler state
    pub async fn status(&self) -> SchedulerStatus {
        let state = self.runner.state.read().await;
        SchedulerStatus {
            running: state.looping,
            phase: state.phase,
            last_analysis_at: state.last_analysis_at,
            data_source: self.runner.source.describe(),
            passes_completed: state.passes_completed,
            passes_failed: state.passes_failed,
            consecutive_failures: state.consecutive_failures,
            last_error: state.last_error.clone(),
        }
    }
}

async fn run_loop(runner: Arc<PassRunner>, mut shutdown_rx: broadcast::Receiver<()>) {
    info!("Scheduler loop started");

    loop {
        let last = runner.state.read().await.last_analysis_at;
        if is_due(last, Utc::now(), runner.config.analysis_interval) {
            // Failures are recorded in state and drive the cooldown below
            let _ = runner.run_pass().await;
        } else {
            debug!("Analysis not due yet");
        }

        let sleep_for = runner.next_sleep().await;
        debug!("Scheduler sleeping {}s", sleep_for.as_secs());

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = shutdown_rx.recv() => {
                info!("Scheduler received shutdown signal");
                break;
            }
        }
    }
}
