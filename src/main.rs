use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dirbatch::batch::{summarize, RetryOrchestrator};
use dirbatch::classify::MarkerClassifier;
use dirbatch::config::Cli;
use dirbatch::discovery::discover;
use dirbatch::invoker::ShellInvoker;
use dirbatch::metrics::export_metrics;
use dirbatch::report::{conclusion, LogFileSink, ReportSink};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dirbatch=info")),
        )
        .init();

    let config = cli.batch_config()?;
    let root = cli.root_dir()?;
    let units = discover(&root, &cli.marker)
        .with_context(|| format!("could not list work units under {}", root.display()))?;

    let orchestrator = RetryOrchestrator::new(
        config,
        Arc::new(ShellInvoker::new(&root)),
        Arc::new(MarkerClassifier::maven()),
    )?
    .with_progress_callback(|round, resolved, total| {
        info!(round, resolved, total, "Progress");
    });

    let state = orchestrator.run(&units, &cli.cmd).await;
    let report = summarize(&units, &state);

    let files = LogFileSink::new(&cli.log_dir).write(&cli.cmd, &report)?;
    print!("{}", conclusion(&report));
    println!("raw log    : {}", files.raw.display());
    println!("simple log : {}", files.simple.display());
    println!("error log  : {}", files.errors.display());

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if cli.metrics {
        print!("{}", export_metrics());
    }

    Ok(())
}
