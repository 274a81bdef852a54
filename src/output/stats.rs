//! Statistics over the checkpoint and the output directory
//!
//! This module backs the `--stats` mode: it combines the persisted crawl
//! state with what is actually on disk.

use crate::config::Config;
use crate::output::reconcile::item_files;
use crate::output::OutputResult;
use crate::state::CrawlState;
use std::path::Path;

/// Harvest statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestStatistics {
    /// Work items listed in the configuration
    pub total_items: usize,

    /// Configured work items already completed
    pub completed_items: usize,

    /// Configured work items still to do
    pub pending_items: Vec<String>,

    /// Record ids recorded as emitted
    pub seen_records: usize,

    /// Per-item files in the output directory
    pub item_files: usize,

    /// Data rows in the aggregate file, if it exists
    pub aggregate_rows: Option<u64>,

    /// Files in the artifact directory
    pub artifacts: usize,

    /// Total size of those files
    pub artifact_bytes: u64,
}

/// Loads statistics for `config` given the current state
///
/// # Arguments
///
/// * `config` - The harvest configuration
/// * `state` - State loaded from the checkpoint
pub fn load_statistics(config: &Config, state: &CrawlState) -> OutputResult<HarvestStatistics> {
    let pending_items: Vec<String> = config
        .work
        .terms
        .iter()
        .filter(|term| !state.is_completed(term))
        .cloned()
        .collect();

    let aggregate = config.output.aggregate_path();
    let item_files = if config.output.dir.is_dir() {
        item_files(&config.output.dir, &config.output.item_file_prefix, &aggregate)?.len()
    } else {
        0
    };

    let aggregate_rows = if aggregate.is_file() {
        let mut reader = csv::Reader::from_path(&aggregate)?;
        let mut rows = 0u64;
        for record in reader.records() {
            record?;
            rows += 1;
        }
        Some(rows)
    } else {
        None
    };

    let (artifacts, artifact_bytes) = directory_usage(&config.capture.screenshots_dir);

    Ok(HarvestStatistics {
        total_items: config.work.terms.len(),
        completed_items: config.work.terms.len() - pending_items.len(),
        pending_items,
        seen_records: state.seen_record_ids().len(),
        item_files,
        aggregate_rows,
        artifacts,
        artifact_bytes,
    })
}

fn directory_usage(dir: &Path) -> (usize, u64) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return (0, 0);
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.metadata().ok())
        .filter(|meta| meta.is_file())
        .fold((0, 0), |(count, bytes), meta| (count + 1, bytes + meta.len()))
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Work items:");
    println!("  Configured: {}", stats.total_items);
    println!("  Completed: {}", stats.completed_items);
    println!("  Pending: {}", stats.pending_items.len());
    println!();

    println!("Records:");
    println!("  Emitted (seen ids): {}", stats.seen_records);
    match stats.aggregate_rows {
        Some(rows) => println!("  Aggregate rows: {}", rows),
        None => println!("  Aggregate rows: (no aggregate file)"),
    }
    println!("  Per-item files: {}", stats.item_files);
    println!();

    println!("Artifacts:");
    println!(
        "  {} file(s), {:.1} MiB",
        stats.artifacts,
        stats.artifact_bytes as f64 / (1024.0 * 1024.0)
    );
    println!();

    if let Some(rows) = stats.aggregate_rows {
        if rows != stats.seen_records as u64 {
            println!(
                "Note: aggregate has {} row(s) but {} id(s) are recorded; \
                 consider --rebuild-aggregate",
                rows, stats.seen_records
            );
        }
    }

    if !stats.pending_items.is_empty() {
        println!("Pending items:");
        for item in &stats.pending_items {
            println!("  - {}", item);
        }
    }
}
