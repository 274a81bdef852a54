//! Snap-Harvest main entry point
//!
//! This is the command-line interface for the Snap-Harvest ingestion pipeline.

use anyhow::Context;
use clap::Parser;
use snap_harvest::config::{load_config_with_hash, resolve_credential, Config, LoggingConfig};
use snap_harvest::ingest::{plan, run_ingest};
use snap_harvest::output::{
    load_statistics, print_statistics, rebuild_aggregate, shared_item_names,
};
use snap_harvest::state::{CheckpointStore, CrawlState};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Snap-Harvest: a resumable record ingestion pipeline
///
/// Snap-Harvest queries a paginated source for each configured term, keeps
/// the records accepted by the filter, captures a snapshot of each record's
/// resource and appends the results to CSV files. Progress is checkpointed,
/// so an interrupted run resumes where it stopped.
#[derive(Parser, Debug)]
#[command(name = "snap-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable record ingestion pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start fresh, discarding the existing checkpoint
    #[arg(long)]
    fresh: bool,

    /// Validate config and show which work items would run
    #[arg(long, conflicts_with_all = ["stats", "rebuild_aggregate"])]
    dry_run: bool,

    /// Show statistics from the checkpoint and output files and exit
    #[arg(long, conflicts_with_all = ["dry_run", "rebuild_aggregate"])]
    stats: bool,

    /// Rebuild the aggregate file from the per-item files and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    rebuild_aggregate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // The log file location comes from the config, so load it before logging starts
    let loaded = load_config_with_hash(&cli.config);
    let logging = loaded.as_ref().ok().map(|(config, _)| &config.logging);
    let _log_guard = setup_logging(cli.verbose, cli.quiet, logging)?;

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match loaded {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config, cli.fresh);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.rebuild_aggregate {
        handle_rebuild(&config)?;
    } else {
        handle_ingest(config, config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Returns the guard flushing the log file writer; keep it alive until exit.
fn setup_logging(
    verbose: u8,
    quiet: bool,
    logging: Option<&LoggingConfig>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("snap_harvest=info,warn"),
            1 => EnvFilter::new("snap_harvest=debug,info"),
            2 => EnvFilter::new("snap_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let log_file = logging.and_then(|l| l.file.as_deref().map(|file| (file, l.max_files)));
    let (file_layer, guard) = match log_file {
        Some((file, max_files)) => {
            let (writer, guard) = tracing_appender::non_blocking(rolling_log(file, max_files)?);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Daily-rotated log file keeping at most `max_files` files
fn rolling_log(file: &Path, max_files: usize) -> anyhow::Result<RollingFileAppender> {
    let dir = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = file
        .file_name()
        .with_context(|| format!("Log file {} has no file name", file.display()))?
        .to_string_lossy()
        .into_owned();

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(max_files)
        .build(dir)
        .with_context(|| format!("Failed to open log file {}", file.display()))
}

/// Handles the --dry-run mode: shows the plan without touching anything
fn handle_dry_run(config: &Config, fresh: bool) {
    println!("=== Snap-Harvest Dry Run ===\n");

    println!("Source:");
    println!("  Endpoint: {}", config.source.endpoint);
    println!("  Credential variable: {}", config.source.access_token_env);
    println!(
        "  Page limit: {}, max pages: {}",
        config.source.page_limit, config.source.max_pages
    );

    println!("\nCapture:");
    println!("  Artifacts: {}", config.capture.screenshots_dir.display());
    println!("  Minimum free space: {} GiB", config.capture.min_free_gb);
    println!("  Retention: {} days", config.capture.retention_days);

    println!("\nOutput:");
    println!("  Aggregate: {}", config.output.aggregate_path().display());
    println!("  Checkpoint: {}", config.output.state_path().display());
    println!("  Batch size: {}", config.output.batch_size);

    let store = CheckpointStore::new(config.output.state_path());
    let state = if fresh {
        CrawlState::new()
    } else {
        store.load()
    };
    let plan = plan(config, &state);

    println!("\nCompleted Work Items ({}):", plan.completed.len());
    for term in &plan.completed {
        println!("  - {}", term);
    }

    println!("\nPending Work Items ({}):", plan.pending.len());
    for term in &plan.pending {
        println!("  - {}", term);
    }

    for (name, terms) in shared_item_names(&config.work.terms) {
        println!(
            "\n! Work items {:?} share the output file {}",
            terms,
            config.output.item_path(&name).display()
        );
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would process up to {} work item(s)",
        plan.pending.len().min(config.run.max_items_per_run)
    );
}

/// Handles the --stats mode
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let store = CheckpointStore::new(config.output.state_path());
    println!("Checkpoint: {}\n", store.path().display());

    let state = store.load();
    let stats = load_statistics(config, &state).context("failed to collect statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --rebuild-aggregate mode
fn handle_rebuild(config: &Config) -> anyhow::Result<()> {
    let aggregate = config.output.aggregate_path();
    let report = rebuild_aggregate(
        &config.output.dir,
        &config.output.item_file_prefix,
        &aggregate,
    )
    .with_context(|| format!("failed to rebuild {}", aggregate.display()))?;

    println!(
        "✓ Rebuilt {} from {} file(s): {} row(s), {} duplicate(s) dropped",
        aggregate.display(),
        report.files,
        report.rows,
        report.duplicates
    );
    Ok(())
}

/// Handles the main ingestion run
async fn handle_ingest(config: Config, config_hash: String, fresh: bool) -> anyhow::Result<()> {
    let credential = match resolve_credential(&config) {
        Ok(credential) => credential,
        Err(e) => {
            tracing::error!("{}", e);
            return Err(e.into());
        }
    };

    if fresh {
        tracing::info!("Starting fresh run (discarding previous checkpoint)");
        CheckpointStore::new(config.output.state_path())
            .clear()
            .context("failed to discard checkpoint")?;
    } else {
        tracing::info!("Starting run (resuming from checkpoint if present)");
    }
    tracing::info!("Work items: {}", config.work.terms.len());

    let shutdown = CancellationToken::new();
    tokio::spawn(listen_for_signals(shutdown.clone()));

    match run_ingest(config, credential, config_hash, shutdown).await {
        Ok(summary) => {
            tracing::info!("Run ended: {}", summary.stop_reason);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}

/// Cancels the token on SIGINT or SIGTERM; state is saved by the run loop
async fn listen_for_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                None
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = async {
                match terminate.as_mut() {
                    Some(stream) => { stream.recv().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::warn!("Shutdown requested, finishing current record");
    shutdown.cancel();
}
