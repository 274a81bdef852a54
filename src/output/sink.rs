//! Append-only CSV sink with batching
//!
//! Rows go to two files: the per-work-item file and the aggregate file. The
//! header is written only when a file is new or empty. The two appends are not
//! transactional; both files are reconcilable by `record_id`.

use crate::output::row::OutputRow;
use crate::output::OutputResult;
use std::fs::OpenOptions;
use std::path::Path;

/// Appends `rows` to both the per-item and the aggregate file
///
/// # Arguments
///
/// * `rows` - Rows in processing order
/// * `per_item` - File for the current work item
/// * `aggregate` - File shared by all work items
///
/// # Returns
///
/// The number of rows appended to each file
pub fn append_batch(rows: &[OutputRow], per_item: &Path, aggregate: &Path) -> OutputResult<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    append_rows(rows, per_item)?;
    append_rows(rows, aggregate)?;

    tracing::debug!(
        "Appended {} row(s) to {} and {}",
        rows.len(),
        per_item.display(),
        aggregate.display()
    );
    Ok(rows.len())
}

fn append_rows(rows: &[OutputRow], path: &Path) -> OutputResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let needs_header = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Rows waiting to be appended
///
/// [`push`](Self::push) reports when the threshold is reached; the caller
/// then drains the buffer with [`take`](Self::take) and appends it.
#[derive(Debug)]
pub struct BatchBuffer {
    rows: Vec<OutputRow>,
    threshold: usize,
}

impl BatchBuffer {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            rows: Vec::with_capacity(threshold),
            threshold,
        }
    }

    /// Adds a row; returns true once the buffer is full
    pub fn push(&mut self, row: OutputRow) -> bool {
        self.rows.push(row);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.threshold
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Drains all buffered rows
    pub fn take(&mut self) -> Vec<OutputRow> {
        std::mem::take(&mut self.rows)
    }
}
