//! pmx-reconcile - Metadata reconciliation CLI
//!
//! Reads a JSON array of media records (one per file, each holding the
//! entries of every extraction pass), reconciles them and writes the
//! per-file reports as JSON.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use pmx_common::logging::init_logging;
use pmx_reconcile::config::ReconcilerConfig;
use pmx_reconcile::timezone::TzfLookup;
use pmx_reconcile::{reconcile_batch, BatchSummary, MediaRecord, MergePipeline};

/// Command-line arguments for pmx-reconcile
#[derive(Parser, Debug)]
#[command(name = "pmx-reconcile")]
#[command(about = "Reconcile media metadata from multiple sources")]
#[command(version)]
struct Args {
    /// JSON file with the media records to reconcile
    input: PathBuf,

    /// Write the reports here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long, env = "PMX_CONFIG")]
    config: Option<PathBuf>,

    /// Concurrent reconciliations (0 = number of CPUs)
    #[arg(short, long, env = "PMX_WORKERS")]
    workers: Option<usize>,

    /// Log level, overrides the config file
    #[arg(long, env = "PMX_LOG_LEVEL")]
    log_level: Option<String>,

    /// Only report files with conflicts or errors
    #[arg(long)]
    conflicts_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        ReconcilerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(workers) = args.workers {
        config.batch.workers = workers;
    }
    init_logging(&config.logging).context("Failed to initialize logging")?;

    info!("Starting pmx-reconcile {}", env!("CARGO_PKG_VERSION"));

    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let records: Vec<MediaRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid media records in {}", args.input.display()))?;
    info!(files = records.len(), input = %args.input.display(), "Loaded media records");

    let timezones = Arc::new(TzfLookup::new());
    let pipeline = Arc::new(MergePipeline::standard(&config.merge, timezones));

    let mut reports =
        reconcile_batch(pipeline, records, config.batch.effective_workers()).await;

    for report in &reports {
        for (field, messages) in &report.outcome.conflicts {
            for message in messages {
                warn!(path = %report.path, field = %field, "{}", message);
            }
        }
    }

    let summary = BatchSummary::from_reports(&reports);
    info!(
        scanned = summary.scanned,
        merged = summary.merged,
        with_conflicts = summary.with_conflicts,
        with_errors = summary.with_errors,
        "Reconciliation finished"
    );

    if args.conflicts_only {
        reports.retain(|r| r.outcome.has_conflicts() || r.outcome.has_errors());
    }

    let json = serde_json::to_string_pretty(&reports).context("Failed to serialize reports")?;
    match &args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(output = %path.display(), "Reports written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json).context("Failed to write reports")?;
        }
    }

    Ok(())
}
