//! Ingestion orchestrator - the main run loop
//!
//! This module drives one run over the configured work items:
//! - Loading the checkpoint and sweeping old artifacts
//! - Fetching, filtering and deduplicating records per work item
//! - Capturing artifacts and appending rows in batches
//! - Checkpointing after every batch and every completed item
//! - Stopping cleanly on shutdown or when a budget runs out

use crate::capture::{CaptureOutcome, SnapshotCapturer};
use crate::config::Config;
use crate::filter::FilterPredicate;
use crate::guard::enforce_retention;
use crate::output::{
    append_batch, artifact_id, shared_item_names, term_safe, BatchBuffer, OutputRow,
};
use crate::pacing::pause;
use crate::source::{FetchClient, RecordSource, SourceError};
use crate::state::{CheckpointStore, CrawlState, RunPhase};
use crate::{HarvestError, Result};
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    /// Every work item was visited
    #[default]
    Completed,
    /// The shutdown token was cancelled
    Shutdown,
    /// The wall-clock budget ran out
    RuntimeBudget,
    /// The per-run item budget ran out
    ItemBudget,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Completed => "completed",
            StopReason::Shutdown => "shutdown",
            StopReason::RuntimeBudget => "runtime-budget",
            StopReason::ItemBudget => "item-budget",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub items_completed: usize,
    pub items_skipped: usize,
    pub items_failed: usize,
    pub items_partial: usize,
    pub rows_written: usize,
    pub records_filtered: usize,
    pub records_duplicate: usize,
    pub artifacts_captured: usize,
    pub capture_failures: usize,
    pub stop_reason: StopReason,
}

/// How processing of a single work item ended
enum ItemEnd {
    Completed,
    Interrupted(StopReason),
}

/// Single-worker ingestion run over a [`RecordSource`]
pub struct Orchestrator<S> {
    config: Config,
    fetcher: FetchClient<S>,
    capturer: SnapshotCapturer,
    filter: Box<dyn FilterPredicate>,
    store: CheckpointStore,
    state: CrawlState,
    phase: RunPhase,
    shutdown: CancellationToken,
    config_hash: Option<String>,
    deadline: Option<Instant>,
}

impl<S: RecordSource> Orchestrator<S> {
    /// Creates an orchestrator in the `Idle` phase
    ///
    /// # Arguments
    ///
    /// * `config` - The harvest configuration
    /// * `fetcher` - Paginating client over the record source
    /// * `capturer` - Snapshot capturer, owning the renderer
    /// * `filter` - Record acceptance predicate
    /// * `shutdown` - Cooperative shutdown token
    pub fn new(
        config: Config,
        fetcher: FetchClient<S>,
        capturer: SnapshotCapturer,
        filter: Box<dyn FilterPredicate>,
        shutdown: CancellationToken,
    ) -> Self {
        let store = CheckpointStore::new(config.output.state_path());
        Self {
            config,
            fetcher,
            capturer,
            filter,
            store,
            state: CrawlState::new(),
            phase: RunPhase::Idle,
            shutdown,
            config_hash: None,
            deadline: None,
        }
    }

    /// Records the configuration hash in every checkpoint written
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    /// Runs every pending work item
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run ended normally, by shutdown or by budget
    /// * `Err(HarvestError::SourceAuth)` - The source refused the credentials;
    ///   rows were flushed and state saved before returning
    pub async fn run(&mut self) -> Result<RunSummary> {
        self.start().await?;

        let started = Instant::now();
        let runtime = Duration::from_secs(self.config.run.max_runtime_secs);
        self.deadline = started.checked_add(runtime);

        let mut summary = RunSummary::default();
        let outcome = self.run_items(&mut summary).await;

        match outcome {
            Ok(reason) => {
                summary.stop_reason = reason;
                if reason != StopReason::Completed {
                    tracing::info!("Stopping run: {}", reason);
                    self.transition(RunPhase::ShuttingDown)?;
                }
                self.finish().await?;
                tracing::info!(
                    "Run finished ({}): {} item(s) completed, {} skipped, {} failed, \
                     {} row(s) written, {} artifact(s) captured in {:?}",
                    reason,
                    summary.items_completed,
                    summary.items_skipped,
                    summary.items_failed,
                    summary.rows_written,
                    summary.artifacts_captured,
                    started.elapsed()
                );
                Ok(summary)
            }
            Err(e) => {
                tracing::error!("Aborting run: {}", e);
                self.transition(RunPhase::ShuttingDown)?;
                self.finish().await?;
                Err(e)
            }
        }
    }

    /// `Idle → Running`: load state, sweep old artifacts, launch the renderer
    async fn start(&mut self) -> Result<()> {
        self.state = self.store.load();

        if let Some(hash) = &self.config_hash {
            match self.state.config_hash() {
                Some(previous) if previous != hash => {
                    tracing::info!(
                        "Configuration changed since the last checkpoint ({} -> {})",
                        previous,
                        hash
                    );
                }
                _ => {}
            }
            self.state.set_config_hash(hash.clone());
        }

        for (name, terms) in shared_item_names(&self.config.work.terms) {
            tracing::warn!(
                "Work items {:?} share the output file {}",
                terms,
                self.config.output.item_path(&name).display()
            );
        }

        enforce_retention(
            self.capturer.artifacts_dir(),
            self.config.capture.retention(),
        );

        if let Err(e) = self.capturer.start_renderer().await {
            tracing::warn!("Renderer unavailable at start, will retry on demand: {}", e);
        }

        self.transition(RunPhase::Running)
    }

    /// `→ Finished`: final save and renderer disposal
    async fn finish(&mut self) -> Result<()> {
        self.save_state();
        self.capturer.shutdown().await;
        self.transition(RunPhase::Finished)
    }

    fn transition(&mut self, next: RunPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!("Run phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    async fn run_items(&mut self, summary: &mut RunSummary) -> Result<StopReason> {
        let terms = self.config.work.terms.clone();
        let restart_every = self.config.capture.renderer_restart_every.max(1) as usize;
        let throttle = Duration::from_millis(self.config.run.item_throttle_ms);
        let cooldown = Duration::from_millis(self.config.run.failure_cooldown_ms);

        let mut attempted = 0usize;
        let mut completed_since_restart = 0usize;
        let mut previous_pending = false;

        for term in &terms {
            if self.shutdown.is_cancelled() {
                return Ok(StopReason::Shutdown);
            }
            if self.budget_exhausted() {
                return Ok(StopReason::RuntimeBudget);
            }

            if self.state.is_completed(term) {
                tracing::info!("Skipping completed work item '{}'", term);
                summary.items_skipped += 1;
                continue;
            }

            if attempted >= self.config.run.max_items_per_run {
                tracing::info!(
                    "Item budget of {} reached",
                    self.config.run.max_items_per_run
                );
                return Ok(StopReason::ItemBudget);
            }

            if previous_pending && !pause(&self.shutdown, throttle).await {
                return Ok(StopReason::Shutdown);
            }
            previous_pending = true;
            attempted += 1;

            tracing::info!("Processing work item '{}'", term);
            match self.process_item(term, summary).await {
                Ok(ItemEnd::Completed) => {
                    summary.items_completed += 1;
                    completed_since_restart += 1;
                    if completed_since_restart >= restart_every {
                        completed_since_restart = 0;
                        // A failed relaunch is logged by the capturer and retried lazily
                        let _ = self.capturer.restart_renderer().await;
                    }
                }
                Ok(ItemEnd::Interrupted(reason)) => return Ok(reason),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    summary.items_failed += 1;
                    tracing::error!("Work item '{}' failed: {}", term, e);
                    if !pause(&self.shutdown, cooldown).await {
                        return Ok(StopReason::Shutdown);
                    }
                }
            }
        }

        Ok(StopReason::Completed)
    }

    /// Processes one pending work item
    ///
    /// Records are handled in fetch order. Each emitted record id is marked
    /// seen before its batch is appended, and the checkpoint is saved ahead
    /// of every append, so a crash can lose rows but never duplicate them.
    async fn process_item(&mut self, term: &str, summary: &mut RunSummary) -> Result<ItemEnd> {
        let outcome = match self.fetcher.fetch_term(term).await {
            Ok(outcome) => outcome,
            Err(SourceError::Auth { status, message }) => {
                return Err(HarvestError::SourceAuth { status, message })
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(partial) = &outcome.partial {
            summary.items_partial += 1;
            tracing::warn!("{}", partial);
        }
        tracing::info!(
            "Fetched {} record(s) for '{}' over {} page(s)",
            outcome.records.len(),
            term,
            outcome.pages
        );

        let safe = term_safe(term);
        let per_item = self.config.output.item_path(&safe);
        let mut buffer = BatchBuffer::new(self.config.output.batch_size);
        let mut capacity_exhausted = false;
        let mut interrupted = None;

        for record in &outcome.records {
            interrupted = self.stop_requested();
            if interrupted.is_some() {
                break;
            }

            if self.state.is_seen(&record.id) {
                tracing::debug!("Skipping already emitted record {}", record.id);
                summary.records_duplicate += 1;
                continue;
            }

            if !self.filter.is_accepted(record.text().as_deref()) {
                tracing::debug!("Record {} rejected by filter", record.id);
                summary.records_filtered += 1;
                continue;
            }

            let artifact = if capacity_exhausted {
                None
            } else {
                let stem = artifact_id(&safe, &record.id);
                match self
                    .capturer
                    .capture(&record.id, record.resource_url.as_deref(), &stem)
                    .await
                {
                    CaptureOutcome::Captured(artifact) => {
                        summary.artifacts_captured += 1;
                        Some(artifact)
                    }
                    CaptureOutcome::Skipped => None,
                    CaptureOutcome::InsufficientCapacity(_) => {
                        tracing::warn!(
                            "Low disk space: no more captures for '{}' in this item",
                            term
                        );
                        capacity_exhausted = true;
                        None
                    }
                    CaptureOutcome::Failed => {
                        summary.capture_failures += 1;
                        None
                    }
                }
            };

            let row = OutputRow::from_record(term, record, artifact.as_ref());
            self.state.mark_seen(&record.id);
            if buffer.push(row) {
                self.flush(&mut buffer, &per_item, summary)?;
            }
        }

        self.flush(&mut buffer, &per_item, summary)?;

        // A stop during fetch leaves the item unfinished even with no records to walk
        if interrupted.is_none() {
            interrupted = self.stop_requested();
        }

        if let Some(reason) = interrupted {
            tracing::info!("Work item '{}' interrupted ({}), not marked completed", term, reason);
            self.save_state();
            return Ok(ItemEnd::Interrupted(reason));
        }

        self.state.mark_completed(term);
        self.save_state();
        tracing::info!("Completed work item '{}'", term);
        Ok(ItemEnd::Completed)
    }

    /// Saves the checkpoint, then appends the buffered rows
    fn flush(
        &self,
        buffer: &mut BatchBuffer,
        per_item: &Path,
        summary: &mut RunSummary,
    ) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }

        self.save_state();
        let rows = buffer.take();
        let written = append_batch(&rows, per_item, &self.config.output.aggregate_path())?;
        summary.rows_written += written;
        Ok(())
    }

    /// Persists the in-memory state; failures are logged and retried at the next save
    fn save_state(&self) {
        if let Err(e) = self.store.save(&self.state) {
            tracing::error!(
                "Failed to save checkpoint {}: {}",
                self.store.path().display(),
                e
            );
        }
    }

    fn stop_requested(&self) -> Option<StopReason> {
        if self.shutdown.is_cancelled() {
            Some(StopReason::Shutdown)
        } else if self.budget_exhausted() {
            Some(StopReason::RuntimeBudget)
        } else {
            None
        }
    }

    fn budget_exhausted(&self) -> bool {
        self.deadline.map_or(false, |deadline| Instant::now() >= deadline)
    }
}
