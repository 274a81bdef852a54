//! Ingestion module wiring the pipeline together
//!
//! This module contains the orchestrator run loop and the entry point that
//! assembles it from a configuration:
//! - HTTP record source with retrying pagination
//! - Snapshot capturer with the built-in HTML renderer
//! - The configured record filter

mod orchestrator;

pub use orchestrator::{Orchestrator, RunSummary, StopReason};

use crate::capture::{CaptureSettings, HtmlRendererFactory, SnapshotCapturer};
use crate::config::Config;
use crate::filter::build_filter;
use crate::guard::ResourceGuard;
use crate::source::{build_http_client, FetchClient, FetchSettings, GraphApiSource};
use crate::state::CrawlState;
use crate::Result;
use tokio_util::sync::CancellationToken;

/// Runs a complete ingestion
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `credential` - Access token for the source
/// * `config_hash` - Hash recorded in the checkpoint
/// * `shutdown` - Cancelled by the signal handler
///
/// # Returns
///
/// * `Ok(RunSummary)` - The run ended normally, by shutdown or by budget
/// * `Err(HarvestError)` - Setup failed or the source refused the credentials
pub async fn run_ingest(
    config: Config,
    credential: String,
    config_hash: String,
    shutdown: CancellationToken,
) -> Result<RunSummary> {
    let client = build_http_client(&config)?;

    let source = GraphApiSource::new(client.clone(), &config.source, credential)?;
    let fetcher = FetchClient::new(
        source,
        FetchSettings::from_config(&config),
        shutdown.clone(),
    );

    let capturer = SnapshotCapturer::new(
        client.clone(),
        ResourceGuard::for_filesystem(&config.capture.screenshots_dir),
        Box::new(HtmlRendererFactory::new(client)),
        CaptureSettings::from_config(&config.capture),
    );

    let filter = build_filter(&config.filter);

    let mut orchestrator = Orchestrator::new(config, fetcher, capturer, filter, shutdown)
        .with_config_hash(config_hash);
    orchestrator.run().await
}

/// Work items split by checkpoint status, in configured order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunPlan {
    pub pending: Vec<String>,
    pub completed: Vec<String>,
}

/// Computes what a run would do given the current state
pub fn plan(config: &Config, state: &CrawlState) -> RunPlan {
    let (completed, pending) = config
        .work
        .terms
        .iter()
        .cloned()
        .partition(|term| state.is_completed(term));

    RunPlan { pending, completed }
}
