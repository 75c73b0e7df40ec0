//! CLI interface for incident-insights

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::analysis::Aggregator;
use crate::config::{self, Config};
use crate::monitor::{AnalysisScheduler, JsonFileSource};
use crate::query::QueryEngine;
use crate::store::AnalysisStore;

#[derive(Parser)]
#[command(name = "incident-insights")]
#[command(about = "Periodic incident analysis with persistent patterns and insights", long_about = None)]
#[command(version)]
struct Cli {
    /// Use this config file instead of the default location
    #[arg(short, long, global = true, env = "INCIDENT_INSIGHTS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analysis scheduler until Ctrl+C
    Run {
        /// Override the incident file from the config
        #[arg(short, long)]
        source: Option<PathBuf>,
    },
    /// Run a single analysis pass now
    Analyze {
        /// Override the incident file from the config
        #[arg(short, long)]
        source: Option<PathBuf>,
    },
    /// List stored patterns, most recent first
    Patterns {
        /// Only this pattern type
        #[arg(short = 't', long = "type")]
        pattern_type: Option<String>,
        /// Maximum results to return
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show one pattern snapshot
    Pattern {
        /// Pattern type (hourly, daily, monthly, crime_types, locations)
        pattern_type: String,
    },
    /// List stored insights, newest first
    Insights {
        /// Only this insight type
        #[arg(short = 't', long = "type")]
        insight_type: Option<String>,
        /// Maximum results to return
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Mark an insight as valid or invalid
    #[command(group(ArgGroup::new("verdict").required(true).args(["valid", "invalid"])))]
    Validate {
        /// Insight id
        id: i64,
        #[arg(long)]
        valid: bool,
        #[arg(long)]
        invalid: bool,
        /// Reviewer comment
        #[arg(short, long)]
        feedback: Option<String>,
    },
    /// Ask a question about the stored analysis
    Ask {
        /// The question
        question: Vec<String>,
    },
    /// Delete all stored patterns and insights
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Show or reset configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::config_path()?,
    };

    match cli.command {
        Commands::Run { source } => run_scheduler(&config, source).await?,
        Commands::Analyze { source } => analyze_once(&config, source).await?,
        Commands::Patterns { pattern_type, limit } => {
            let store = open_store(&config).await?;
            let patterns = store.patterns.list(pattern_type.as_deref(), limit).await?;
            if patterns.is_empty() {
                println!("No patterns stored. Run 'incident-insights analyze' first.");
            }
            for pattern in patterns {
                println!(
                    "{:<12} confidence {:.2}  updated {}",
                    pattern.pattern_type,
                    pattern.confidence,
                    pattern.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Commands::Pattern { pattern_type } => {
            let store = open_store(&config).await?;
            match store.patterns.get(&pattern_type).await {
                Ok(pattern) => println!("{}", serde_json::to_string_pretty(&pattern)?),
                Err(e) if e.is_not_found() => {
                    eprintln!("Pattern not found: {}", pattern_type);
                    eprintln!("Use 'incident-insights patterns' to see stored types.");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Insights { insight_type, limit } => {
            let store = open_store(&config).await?;
            let insights = store.insights.list(limit, insight_type.as_deref()).await?;
            if insights.is_empty() {
                println!("No insights stored.");
            }
            for insight in insights {
                let status = match insight.validated {
                    Some(true) => "valid",
                    Some(false) => "invalid",
                    None => "unreviewed",
                };
                println!(
                    "[{}] {} ({}, {:.2}, {})",
                    insight.id, insight.text, insight.insight_type, insight.confidence, status
                );
                if let Some(feedback) = &insight.validation_feedback {
                    println!("      feedback: {}", feedback);
                }
            }
        }
        Commands::Validate { id, valid, invalid: _, feedback } => {
            let store = open_store(&config).await?;
            match store.insights.validate(id, valid, feedback.as_deref()).await {
                Ok(()) => println!("Insight {} marked {}.", id, if valid { "valid" } else { "invalid" }),
                Err(e) if e.is_not_found() => anyhow::bail!("Insight not found: {}", id),
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Ask { question } => {
            let question = question.join(" ");
            let store = open_store(&config).await?;
            let answer = QueryEngine::new(store.patterns.clone()).answer(&question).await?;
            println!("{}", answer);
        }
        Commands::Reset { yes } => {
            if !yes {
                println!("This deletes every stored pattern and insight. Re-run with --yes to confirm.");
                return Ok(());
            }
            let store = open_store(&config).await?;
            let (patterns, insights) = store.reset().await?;
            println!("Removed {} patterns and {} insights.", patterns, insights);
        }
        Commands::Config { show, reset } => {
            if reset {
                match &cli.config {
                    Some(path) => Config::default().save_to(path)?,
                    None => Config::default().save()?,
                }
                println!("Configuration reset to defaults.");
            } else if show {
                println!("# {}", config_path.display());
                println!("{}", toml::to_string_pretty(&config).context("Failed to serialize config")?);
            } else {
                println!("Config file: {}", config_path.display());
                println!("Database: {}", config.store.resolve_path()?.display());
                println!("Use --show to print it or --reset to restore defaults.");
            }
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<AnalysisStore> {
    let path = config.store.resolve_path()?;
    AnalysisStore::open(&path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))
}

async fn build_scheduler(config: &Config, source: Option<PathBuf>) -> Result<AnalysisScheduler> {
    let store = open_store(config).await?;
    let source_path = source.unwrap_or_else(|| config.source.path.clone());

    Ok(AnalysisScheduler::new(
        config.scheduler.to_scheduler_config(),
        Aggregator::new(config.analysis.to_aggregator_config()),
        Arc::new(JsonFileSource::new(source_path)),
        store,
    ))
}

async fn analyze_once(config: &Config, source: Option<PathBuf>) -> Result<()> {
    let scheduler = build_scheduler(config, source).await?;
    let report = scheduler.run_pass_now().await.context("Analysis pass failed")?;

    println!("Analysis pass {} complete.", report.pass_id);
    println!("  Records: {}", report.records);
    println!("  Patterns written: {}", report.patterns_written);
    println!("  Insights written: {}", report.insights_written);
    Ok(())
}

async fn run_scheduler(config: &Config, source: Option<PathBuf>) -> Result<()> {
    let scheduler = build_scheduler(config, source).await?;
    scheduler.start().await;

    let status = scheduler.status().await;
    println!("Scheduler is running.");
    println!("  Source: {}", status.data_source);
    println!("  Analysis interval: {}s", scheduler.config().analysis_interval.as_secs());
    println!();
    println!("Press Ctrl+C to stop.");

    match tokio::signal::ctrl_c().await {
        Ok(()) => println!("\nStopping scheduler..."),
        Err(err) => eprintln!("Unable to listen for shutdown signal: {}", err),
    }

    scheduler.stop().await;

    let status = scheduler.status().await;
    println!(
        "Scheduler stopped after {} passes ({} failed).",
        status.passes_completed + status.passes_failed,
        status.passes_failed
    );
    if let Some(last) = status.last_analysis_at {
        println!("Last successful analysis: {}", last.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}
