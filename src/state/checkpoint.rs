//! Crawl progress and its durable checkpoint
//!
//! The checkpoint is a single pretty-printed JSON document:
//!
//! ```json
//! {
//!   "completed_work_items": ["giảm giá"],
//!   "seen_record_ids": ["123", "456"],
//!   "saved_at": "2026-01-01T00:00:00Z",
//!   "config_hash": "…"
//! }
//! ```
//!
//! Checkpoints written by older tools with `processed_terms` and
//! `processed_ad_ids` load transparently.

use crate::state::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Progress of all runs so far
///
/// Both collections keep insertion order for the persisted form and a hash
/// index for membership checks.
#[derive(Debug, Clone, Default)]
pub struct CrawlState {
    completed: Vec<String>,
    completed_index: HashSet<String>,
    seen: Vec<String>,
    seen_index: HashSet<String>,
    config_hash: Option<String>,
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_completed(&self, term: &str) -> bool {
        self.completed_index.contains(term)
    }

    /// Records a finished work item; returns false if it was already recorded
    pub fn mark_completed(&mut self, term: &str) -> bool {
        if self.completed_index.insert(term.to_string()) {
            self.completed.push(term.to_string());
            true
        } else {
            false
        }
    }

    pub fn is_seen(&self, record_id: &str) -> bool {
        self.seen_index.contains(record_id)
    }

    /// Records an emitted record id; returns false if it was already recorded
    pub fn mark_seen(&mut self, record_id: &str) -> bool {
        if self.seen_index.insert(record_id.to_string()) {
            self.seen.push(record_id.to_string());
            true
        } else {
            false
        }
    }

    /// Completed work items in completion order
    pub fn completed_work_items(&self) -> &[String] {
        &self.completed
    }

    /// Seen record ids in processing order
    pub fn seen_record_ids(&self) -> &[String] {
        &self.seen
    }

    pub fn config_hash(&self) -> Option<&str> {
        self.config_hash.as_deref()
    }

    pub fn set_config_hash(&mut self, hash: impl Into<String>) {
        self.config_hash = Some(hash.into());
    }

    fn from_persisted(persisted: PersistedState) -> Self {
        let mut state = Self::new();
        for term in &persisted.completed_work_items {
            state.mark_completed(term);
        }
        for id in &persisted.seen_record_ids {
            state.mark_seen(id);
        }
        state.config_hash = persisted.config_hash;
        state
    }
}

/// Serialized shape of the checkpoint
#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default, alias = "processed_terms")]
    completed_work_items: Vec<String>,

    #[serde(default, alias = "processed_ad_ids")]
    seen_record_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    config_hash: Option<String>,
}

/// Durable home of the [`CrawlState`]
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted state
    ///
    /// Never fails: a missing checkpoint yields an empty state, and an
    /// unreadable or corrupt one is logged, moved aside to `<name>.corrupt`
    /// and also yields an empty state.
    pub fn load(&self) -> CrawlState {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "No checkpoint at {}, starting with empty state",
                    self.path.display()
                );
                return CrawlState::new();
            }
            Err(e) => {
                tracing::warn!("Failed to read checkpoint {}: {}", self.path.display(), e);
                return CrawlState::new();
            }
        };

        match serde_json::from_slice::<PersistedState>(&bytes) {
            Ok(persisted) => {
                let state = CrawlState::from_persisted(persisted);
                tracing::info!(
                    "Loaded checkpoint: {} work item(s) completed, {} record id(s) seen",
                    state.completed.len(),
                    state.seen.len()
                );
                state
            }
            Err(e) => {
                tracing::warn!(
                    "Checkpoint {} is corrupt ({}), starting with empty state",
                    self.path.display(),
                    e
                );
                self.set_aside_corrupt();
                CrawlState::new()
            }
        }
    }

    fn set_aside_corrupt(&self) {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".corrupt");
        let target = PathBuf::from(name);
        if let Err(e) = std::fs::rename(&self.path, &target) {
            tracing::warn!(
                "Could not move corrupt checkpoint to {}: {}",
                target.display(),
                e
            );
        }
    }

    /// Atomically replaces the persisted state
    ///
    /// The document is written to a sibling temp file, synced and renamed over
    /// the checkpoint, so a failed save leaves the previous checkpoint intact.
    pub fn save(&self, state: &CrawlState) -> StorageResult<()> {
        let persisted = PersistedState {
            completed_work_items: state.completed.clone(),
            seen_record_ids: state.seen.clone(),
            saved_at: Some(Utc::now()),
            config_hash: state.config_hash.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&persisted)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.tmp_path();
        let written = (|| -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.flush()?;
            file.sync_all()?;
            std::fs::rename(&tmp, &self.path)
        })();

        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(StorageError::Io(e));
        }

        tracing::debug!(
            "Checkpoint saved: {} work item(s), {} record id(s)",
            state.completed.len(),
            state.seen.len()
        );
        Ok(())
    }

    /// Deletes the checkpoint, used by fresh runs
    pub fn clear(&self) -> StorageResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
