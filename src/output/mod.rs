//! Output module for tabular results
//!
//! This module handles:
//! - Projecting records into fixed-order rows
//! - Appending batches to per-item and aggregate CSV files
//! - Rebuilding the aggregate from the per-item files
//! - Reporting statistics for `--stats`

mod reconcile;
mod row;
mod sink;
pub mod stats;

pub use reconcile::{item_files, rebuild_aggregate, RebuildReport};
pub use row::{artifact_id, shared_item_names, term_safe, OutputRow, COLUMNS};
pub use sink::{append_batch, BatchBuffer};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
