//! Resource guard for long runs
//!
//! Two responsibilities:
//! - gate artifact capture on free storage capacity
//! - sweep artifacts older than the retention window

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Free space fell below the configured threshold
#[derive(Debug, Clone, Error)]
#[error("insufficient free space under {root}: {available} bytes available, {required} required")]
pub struct CapacityExceeded {
    pub root: String,
    pub available: u64,
    pub required: u64,
}

/// Source of the filesystem's free-space counter
pub trait SpaceProbe: Send + Sync {
    /// Bytes available to this process on the filesystem holding `root`
    fn available_bytes(&self, root: &Path) -> io::Result<u64>;
}

/// [`SpaceProbe`] backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSpaceProbe;

impl SpaceProbe for FsSpaceProbe {
    fn available_bytes(&self, root: &Path) -> io::Result<u64> {
        fs2::available_space(root)
    }
}

/// Outcome of a retention sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Checks capacity of a storage root and enforces artifact retention
pub struct ResourceGuard {
    root: PathBuf,
    probe: Box<dyn SpaceProbe>,
}

impl ResourceGuard {
    /// Creates a guard for the filesystem holding `root`
    pub fn new(root: impl Into<PathBuf>, probe: Box<dyn SpaceProbe>) -> Self {
        Self {
            root: root.into(),
            probe,
        }
    }

    /// Guard backed by the real filesystem counter
    pub fn for_filesystem(root: impl Into<PathBuf>) -> Self {
        Self::new(root, Box::new(FsSpaceProbe))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns true when at least `min_free_bytes` are available
    ///
    /// Has no side effects. A failed free-space query counts as no capacity.
    pub fn has_capacity(&self, min_free_bytes: u64) -> bool {
        self.check_capacity(min_free_bytes).is_ok()
    }

    /// Like [`has_capacity`](Self::has_capacity) but reports the numbers
    pub fn check_capacity(&self, min_free_bytes: u64) -> Result<u64, CapacityExceeded> {
        let available = match self.probe.available_bytes(self.probe_path()) {
            Ok(available) => available,
            Err(e) => {
                tracing::warn!(
                    "Free-space query failed for {}: {}",
                    self.root.display(),
                    e
                );
                0
            }
        };

        tracing::debug!(
            "Free space under {}: {:.2} GiB",
            self.root.display(),
            available as f64 / (1024.0 * 1024.0 * 1024.0)
        );

        if available < min_free_bytes {
            return Err(CapacityExceeded {
                root: self.root.display().to_string(),
                available,
                required: min_free_bytes,
            });
        }
        Ok(available)
    }

    /// Nearest existing ancestor, so the query works before the root is created
    fn probe_path(&self) -> &Path {
        let mut path = self.root.as_path();
        while !path.exists() {
            match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => path = parent,
                _ => return Path::new("."),
            }
        }
        path
    }
}

/// Removes regular files under `root` whose modification age exceeds `max_age`
///
/// Only direct children are considered. Failures on individual files are
/// counted and never abort the sweep; a missing root removes nothing.
pub fn enforce_retention(root: &Path, max_age: Duration) -> RetentionReport {
    let mut report = RetentionReport::default();

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
        Err(e) => {
            tracing::debug!("Retention sweep could not list {}: {}", root.display(), e);
            return report;
        }
    };

    let now = SystemTime::now();
    for entry in entries.flatten() {
        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(_) => {
                report.failed += 1;
                continue;
            }
        };
        report.scanned += 1;

        let age = match metadata.modified() {
            // Files stamped in the future have age zero
            Ok(modified) => now.duration_since(modified).unwrap_or(Duration::ZERO),
            Err(_) => {
                report.failed += 1;
                continue;
            }
        };

        if age <= max_age {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => report.removed += 1,
            Err(e) => {
                report.failed += 1;
                tracing::debug!("Could not remove expired artifact {}: {}", path.display(), e);
            }
        }
    }

    if report.removed > 0 || report.failed > 0 {
        tracing::info!(
            "Retention sweep of {}: removed {} of {} artifact(s), {} failure(s)",
            root.display(),
            report.removed,
            report.scanned,
            report.failed
        );
    }

    report
}
