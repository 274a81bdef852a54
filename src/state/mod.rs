//! State module for tracking ingestion progress
//!
//! # Components
//!
//! - `CrawlState`: completed work items and seen record ids
//! - `CheckpointStore`: atomic JSON persistence of the `CrawlState`
//! - `RunPhase`: lifecycle of one orchestrator run

mod checkpoint;
mod run_phase;

pub use checkpoint::{CheckpointStore, CrawlState};
pub use run_phase::RunPhase;

use thiserror::Error;

/// Errors that can occur while persisting state
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
