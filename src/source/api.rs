//! Source API seam and its HTTP implementation
//!
//! The core only needs two things from the remote source: pages of raw record
//! objects for a term, and an opaque token pointing at the next page.

use crate::config::{Config, SourceConfig};
use crate::source::SourceError;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// One page request issued by the fetch client
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    /// The work item being queried
    pub term: &'a str,

    /// Pagination token from the previous page, `None` for the first page
    pub cursor: Option<&'a str>,

    /// Records requested per page
    pub limit: u32,
}

/// One page of raw records as returned by the source
#[derive(Debug, Clone, Default)]
pub struct RawPage {
    /// Raw record objects, converted to [`crate::source::Record`] by the fetch client
    pub records: Vec<Value>,

    /// Token for the following page, `None` on the last page
    pub next: Option<String>,
}

/// A remote paginated source of records
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetches exactly one page, without retrying
    async fn query_page(&self, request: PageRequest<'_>) -> Result<RawPage, SourceError>;
}

#[derive(Debug, Deserialize)]
struct PageBody {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

/// Graph-style HTTP source: token in a query parameter, `data` array,
/// next page as an absolute URL under `paging.next`
#[derive(Debug, Clone)]
pub struct GraphApiSource {
    client: Client,
    endpoint: Url,
    access_token: String,
    config: SourceConfig,
}

impl GraphApiSource {
    /// Creates a source for the configured endpoint
    ///
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client (see [`build_http_client`])
    /// * `config` - Source section of the configuration
    /// * `access_token` - Resolved credential
    pub fn new(
        client: Client,
        config: &SourceConfig,
        access_token: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| SourceError::Rejected {
                status: None,
                message: format!("invalid endpoint '{}': {}", config.endpoint, e),
            })?;

        Ok(Self {
            client,
            endpoint,
            access_token: access_token.into(),
            config: config.clone(),
        })
    }

    fn first_page_url(&self, request: PageRequest<'_>) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(&self.config.token_param, &self.access_token);
            query.append_pair(&self.config.term_param, request.term);
            query.append_pair("fields", &self.config.fields.join(","));
            query.append_pair("limit", &request.limit.to_string());
            for (key, value) in &self.config.params {
                query.append_pair(key, value);
            }
        }
        url
    }

    async fn decode(response: Response) -> Result<RawPage, SourceError> {
        let bytes = response.bytes().await.map_err(classify_reqwest_error)?;
        let body: PageBody = serde_json::from_slice(&bytes)
            .map_err(|e| SourceError::Decode(format!("invalid page body: {}", e)))?;

        Ok(RawPage {
            records: body.data,
            next: body
                .paging
                .and_then(|p| p.next)
                .filter(|next| !next.is_empty()),
        })
    }
}

#[async_trait]
impl RecordSource for GraphApiSource {
    async fn query_page(&self, request: PageRequest<'_>) -> Result<RawPage, SourceError> {
        let url = match request.cursor {
            // The next-page URL already carries every query parameter
            Some(cursor) => Url::parse(cursor)
                .map_err(|e| SourceError::Decode(format!("invalid next-page cursor: {}", e)))?,
            None => self.first_page_url(request),
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if status.is_success() {
            return Self::decode(response).await;
        }

        let retry_after = parse_retry_after(&response);
        let message = error_message(response).await;
        Err(classify_status(status, message, retry_after))
    }
}

/// Builds the HTTP client shared by the source and the capturer
///
/// The user agent is taken from the `[user-agent]` section and the request
/// timeout from `retry.request-timeout-secs`; both bound every network wait.
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.header_value())
        .timeout(Duration::from_secs(config.retry.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Maps an HTTP status to the retry taxonomy
///
/// | Status | Classification |
/// |--------|----------------|
/// | 401, 403 | Auth (fatal, never retried) |
/// | 429, 500, 502, 503, 504 | Transient (retried with backoff) |
/// | anything else | Rejected (not retried) |
pub fn classify_status(
    status: StatusCode,
    message: String,
    retry_after: Option<Duration>,
) -> SourceError {
    match status.as_u16() {
        401 | 403 => SourceError::Auth {
            status: status.as_u16(),
            message,
        },
        429 | 500 | 502 | 503 | 504 => SourceError::Transient {
            status: Some(status.as_u16()),
            message,
            retry_after,
        },
        code => SourceError::Rejected {
            status: Some(code),
            message,
        },
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> SourceError {
    // Network-level failures are always worth another attempt. The URL is
    // dropped because it carries the access token.
    SourceError::Transient {
        status: error.status().map(|s| s.as_u16()),
        message: error.without_url().to_string(),
        retry_after: None,
    }
}

fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(text) if !text.trim().is_empty() => {
            let trimmed: String = text.trim().chars().take(300).collect();
            format!("{}: {}", status, trimmed)
        }
        _ => status.to_string(),
    }
}
