//! Snap-Harvest: a resumable record ingestion pipeline
//!
//! This crate queries a paginated remote source for a list of work terms,
//! filters and deduplicates the returned records, captures a snapshot of each
//! record's referenced resource, and appends the results to tabular files while
//! checkpointing progress so an interrupted run can resume where it stopped.

pub mod capture;
pub mod config;
pub mod filter;
pub mod guard;
pub mod ingest;
pub mod output;
pub mod pacing;
pub mod source;
pub mod state;

use thiserror::Error;

/// Main error type for Snap-Harvest operations
///
/// Only configuration errors and source authorization errors are meant to reach
/// the top level; everything else is recovered per record or per work item.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Source rejected credentials (HTTP {status}): {message}")]
    SourceAuth { status: u16, message: String },

    #[error("Source error: {0}")]
    Source(#[from] source::SourceError),

    #[error("Capture error: {0}")]
    Capture(#[from] capture::CaptureError),

    #[error("Storage error: {0}")]
    Storage(#[from] state::StorageError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::RunPhase,
        to: state::RunPhase,
    },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true if this error must stop the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::SourceAuth { .. })
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),
}

/// Result type alias for Snap-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use ingest::{run_ingest, Orchestrator, RunSummary, StopReason};
pub use state::{CheckpointStore, CrawlState, RunPhase};
