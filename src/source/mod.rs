//! Source module for pulling records from the remote paginated API
//!
//! This module contains:
//! - The strict [`Record`] schema applied at the fetch boundary
//! - The [`RecordSource`] seam and its HTTP implementation
//! - The retrying, paginating [`FetchClient`]

mod api;
mod client;
mod record;

pub use api::{build_http_client, classify_status, GraphApiSource, PageRequest, RawPage, RecordSource};
pub use client::{FetchClient, FetchOutcome, FetchSettings};
pub use record::{Bounds, Record};

use std::time::Duration;
use thiserror::Error;

/// Failure of a single page request
#[derive(Debug, Error)]
pub enum SourceError {
    /// Credentials were refused; no later request can succeed
    #[error("source rejected credentials (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    /// Network failure or an overloaded/rate-limited source
    #[error("transient network error{}: {message}", fmt_status(.status))]
    Transient {
        status: Option<u16>,
        message: String,
        retry_after: Option<Duration>,
    },

    /// The source refused the request for a reason retrying will not fix
    #[error("request rejected{}: {message}", fmt_status(.status))]
    Rejected { status: Option<u16>, message: String },

    /// The page body could not be understood
    #[error("malformed page: {0}")]
    Decode(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Server-provided minimum wait before retrying
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Pagination stopped early; the records gathered before the failure are kept
#[derive(Debug, Error)]
#[error(
    "partial fetch for '{term}': page {page} failed after {attempts} attempt(s), \
     keeping {records_kept} record(s): {source}"
)]
pub struct PartialFetchError {
    pub term: String,
    /// One-based index of the page that failed
    pub page: u32,
    pub attempts: u32,
    pub records_kept: usize,
    pub source: SourceError,
}
