//! Incident Insights - periodic incident analysis
//!
//! Runs the analysis scheduler and inspects the stored patterns and insights.

use incident_insights::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (INFO level by default, use RUST_LOG=debug for more)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .init();

    // Run CLI
    cli::run().await
}
