//! Rebuilding the aggregate file from per-item files
//!
//! Appends to the per-item and aggregate files are not transactional, so a
//! crash between them can leave the aggregate short. Rebuilding reads every
//! per-item file in name order, keeps the first row for each `record_id`, and
//! atomically replaces the aggregate.

use crate::output::row::COLUMNS;
use crate::output::{OutputError, OutputResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Outcome of an aggregate rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub files: usize,
    pub rows: usize,
    pub duplicates: usize,
}

/// Per-item files in `dir` whose name starts with `prefix`, sorted by name
pub fn item_files(dir: &Path, prefix: &str, aggregate: &Path) -> OutputResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path == aggregate {
            continue;
        }
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with(prefix) && n.ends_with(".csv"));
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Rebuilds `aggregate` from the per-item files in `dir`
///
/// Columns are matched by header name so files with a different column
/// order still merge; unknown columns are dropped and missing ones left
/// empty. A file without a `record_id` column is skipped with a warning.
pub fn rebuild_aggregate(dir: &Path, prefix: &str, aggregate: &Path) -> OutputResult<RebuildReport> {
    let files = item_files(dir, prefix, aggregate)?;
    let mut report = RebuildReport::default();
    let mut seen = HashSet::new();

    let tmp = {
        let mut name = aggregate.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    };

    if let Err(e) = write_merged(&files, &tmp, &mut seen, &mut report) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }

    std::fs::rename(&tmp, aggregate).map_err(OutputError::Io)?;
    tracing::info!(
        "Rebuilt {} from {} file(s): {} row(s), {} duplicate(s) dropped",
        aggregate.display(),
        report.files,
        report.rows,
        report.duplicates
    );
    Ok(report)
}

fn write_merged(
    files: &[PathBuf],
    tmp: &Path,
    seen: &mut HashSet<String>,
    report: &mut RebuildReport,
) -> OutputResult<()> {
    let mut writer = csv::Writer::from_path(tmp)?;
    writer.write_record(COLUMNS)?;

    for file in files {
        let mut reader = csv::Reader::from_path(file)?;
        let headers = reader.headers()?.clone();
        let positions: Vec<Option<usize>> = COLUMNS
            .iter()
            .map(|column| headers.iter().position(|h| h == *column))
            .collect();

        let Some(id_position) = headers.iter().position(|h| h == "record_id") else {
            tracing::warn!("Skipping {}: no record_id column", file.display());
            continue;
        };

        report.files += 1;
        for record in reader.records() {
            let record = record?;
            let id = record.get(id_position).unwrap_or("").trim();
            if id.is_empty() {
                continue;
            }
            if !seen.insert(id.to_string()) {
                report.duplicates += 1;
                continue;
            }

            let projected: Vec<&str> = positions
                .iter()
                .map(|p| p.and_then(|i| record.get(i)).unwrap_or(""))
                .collect();
            writer.write_record(&projected)?;
            report.rows += 1;
        }
    }

    writer.flush()?;
    Ok(())
}
