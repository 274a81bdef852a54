//! Resilient fetch client
//!
//! Follows the source's pagination cursor up to a page budget, retrying each
//! page on transient failures with exponential backoff. Authorization failures
//! propagate immediately; any other exhausted or permanent failure ends the
//! pagination early and is reported alongside the records gathered so far.

use crate::config::Config;
use crate::pacing::pause;
use crate::source::api::{PageRequest, RawPage, RecordSource};
use crate::source::{PartialFetchError, Record, SourceError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry and pagination limits for the fetch client
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub page_limit: u32,
    pub max_pages: u32,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub page_delay: Duration,
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_limit: config.source.page_limit,
            max_pages: config.source.max_pages,
            max_retries: config.retry.max_retries,
            backoff_base: Duration::from_millis(config.retry.backoff_base_ms),
            backoff_max: Duration::from_millis(config.retry.backoff_max_ms),
            page_delay: Duration::from_millis(config.retry.page_delay_ms),
        }
    }

    /// Delay before retry number `attempt + 1`
    ///
    /// `base * 2^attempt`, raised to the server's `Retry-After` when that is
    /// longer, and never above `backoff_max`.
    pub fn backoff_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let exponential = self.backoff_base.saturating_mul(factor);
        let delay = match retry_after {
            Some(hint) => exponential.max(hint),
            None => exponential,
        };
        delay.min(self.backoff_max)
    }
}

/// Records gathered for one work item
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Valid records in fetch order
    pub records: Vec<Record>,

    /// Pages successfully fetched
    pub pages: u32,

    /// Raw objects rejected at the schema boundary
    pub rejected: usize,

    /// Set when pagination ended early because of a failure
    pub partial: Option<PartialFetchError>,
}

/// Page failure annotated with the number of attempts made
struct PageFailure {
    error: SourceError,
    attempts: u32,
}

/// Paginating, retrying client over a [`RecordSource`]
pub struct FetchClient<S> {
    source: S,
    settings: FetchSettings,
    shutdown: CancellationToken,
}

impl<S: RecordSource> FetchClient<S> {
    /// Creates a new fetch client
    ///
    /// # Arguments
    ///
    /// * `source` - The remote source
    /// * `settings` - Retry and pagination limits
    /// * `shutdown` - Cancels backoff and inter-page waits
    pub fn new(source: S, settings: FetchSettings, shutdown: CancellationToken) -> Self {
        Self {
            source,
            settings,
            shutdown,
        }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetches a work item with the configured page limit and page budget
    pub async fn fetch_term(&self, term: &str) -> Result<FetchOutcome, SourceError> {
        self.fetch(term, self.settings.page_limit, self.settings.max_pages)
            .await
    }

    /// Fetches up to `max_pages` pages of records for `term`
    ///
    /// # Returns
    ///
    /// * `Ok(FetchOutcome)` - Records gathered; `partial` is set if pagination
    ///   stopped because of a failure
    /// * `Err(SourceError::Auth)` - The source rejected the credentials; no
    ///   further request can succeed
    pub async fn fetch(
        &self,
        term: &str,
        page_limit: u32,
        max_pages: u32,
    ) -> Result<FetchOutcome, SourceError> {
        let mut outcome = FetchOutcome::default();
        let mut cursor: Option<String> = None;

        while outcome.pages < max_pages {
            let request = PageRequest {
                term,
                cursor: cursor.as_deref(),
                limit: page_limit,
            };

            let page = match self.fetch_page(request).await {
                Ok(page) => page,
                Err(failure) if failure.error.is_auth() => return Err(failure.error),
                Err(failure) => {
                    outcome.partial = Some(PartialFetchError {
                        term: term.to_string(),
                        page: outcome.pages + 1,
                        attempts: failure.attempts,
                        records_kept: outcome.records.len(),
                        source: failure.error,
                    });
                    break;
                }
            };

            outcome.pages += 1;
            self.accept_page(term, page.records, &mut outcome);

            cursor = page.next;
            if cursor.is_none() {
                break;
            }

            if outcome.pages < max_pages && !pause(&self.shutdown, self.settings.page_delay).await
            {
                tracing::info!(
                    "Shutdown requested, stopping pagination for '{}' after {} page(s)",
                    term,
                    outcome.pages
                );
                break;
            }
        }

        tracing::debug!(
            "Fetched {} record(s) in {} page(s) for '{}' ({} rejected)",
            outcome.records.len(),
            outcome.pages,
            term,
            outcome.rejected
        );

        Ok(outcome)
    }

    /// Fetches one page, retrying transient failures
    async fn fetch_page(&self, request: PageRequest<'_>) -> Result<RawPage, PageFailure> {
        let mut attempt = 0u32;

        loop {
            let error = match self.source.query_page(request).await {
                Ok(page) => return Ok(page),
                Err(error) => error,
            };

            if !error.is_transient() || attempt >= self.settings.max_retries {
                return Err(PageFailure {
                    error,
                    attempts: attempt + 1,
                });
            }

            let delay = self.settings.backoff_delay(attempt, error.retry_after());
            tracing::warn!(
                "Transient failure for '{}' ({}), retrying in {:?} (retry {}/{})",
                request.term,
                error,
                delay,
                attempt + 1,
                self.settings.max_retries
            );

            if !pause(&self.shutdown, delay).await {
                return Err(PageFailure {
                    error,
                    attempts: attempt + 1,
                });
            }
            attempt += 1;
        }
    }

    fn accept_page(&self, term: &str, raw: Vec<serde_json::Value>, outcome: &mut FetchOutcome) {
        for value in raw {
            match Record::from_value(value) {
                Ok(record) => outcome.records.push(record),
                Err(reason) => {
                    outcome.rejected += 1;
                    tracing::warn!("Rejected malformed record for '{}': {}", term, reason);
                }
            }
        }
    }
}
