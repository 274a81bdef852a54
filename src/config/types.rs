use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Snap-Harvest
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub work: WorkConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The static list of work items processed by a run
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkConfig {
    /// Search terms, processed in list order
    pub terms: Vec<String>,
}

/// Remote source connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Base URL of the paginated query endpoint
    pub endpoint: String,

    /// Environment variable holding the access token
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    /// Query parameter that carries the access token
    #[serde(default = "default_token_param")]
    pub token_param: String,

    /// Query parameter that carries the work item
    #[serde(default = "default_term_param")]
    pub term_param: String,

    /// Records requested per page
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Maximum pages followed per work item
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Record fields requested from the source
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,

    /// Additional fixed query parameters
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Retry and pacing for source requests
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryConfig {
    /// Retries per page request after the first attempt
    pub max_retries: u32,

    /// Base delay for exponential backoff (milliseconds)
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay (milliseconds)
    pub backoff_max_ms: u64,

    /// Delay between successful page fetches (milliseconds)
    pub page_delay_ms: u64,

    /// Timeout for a single source request (seconds)
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 6,
            backoff_base_ms: 1000,
            backoff_max_ms: 120_000,
            page_delay_ms: 500,
            request_timeout_secs: 30,
        }
    }
}

/// Snapshot capture, renderer lifecycle and disk policy
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CaptureConfig {
    /// Directory receiving captured artifacts
    pub screenshots_dir: PathBuf,

    /// Minimum free space required before capturing (GiB)
    pub min_free_gb: f64,

    /// Artifacts older than this are removed at startup (days)
    pub retention_days: u64,

    /// Renderer is restarted after this many completed work items
    pub renderer_restart_every: u32,

    /// Timeout for the header-only content-type probe (seconds)
    pub probe_timeout_secs: u64,

    /// Timeout for a direct artifact download (seconds)
    pub download_timeout_secs: u64,

    /// Wait for an image element before falling back to the body (milliseconds)
    pub content_ready_timeout_ms: u64,

    /// Wait for the document body (milliseconds)
    pub page_ready_timeout_ms: u64,

    /// Pause between readiness and capture (milliseconds)
    pub settle_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            screenshots_dir: PathBuf::from("data/ad_screenshots"),
            min_free_gb: 5.0,
            retention_days: 90,
            renderer_restart_every: 200,
            probe_timeout_secs: 8,
            download_timeout_secs: 15,
            content_ready_timeout_ms: 6000,
            page_ready_timeout_ms: 8000,
            settle_ms: 1000,
        }
    }
}

impl CaptureConfig {
    /// Minimum free space in bytes
    pub fn min_free_bytes(&self) -> u64 {
        (self.min_free_gb * 1024.0 * 1024.0 * 1024.0) as u64
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(24 * 3600))
    }
}

/// Output file locations and batching
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OutputConfig {
    /// Directory for tabular output and the checkpoint
    pub dir: PathBuf,

    /// Aggregate file name inside `dir`
    pub aggregate_file: String,

    /// Checkpoint file name inside `dir`
    pub state_file: String,

    /// Prefix for per-item file names
    pub item_file_prefix: String,

    /// Rows buffered before a flush
    pub batch_size: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/outputs"),
            aggregate_file: "merged.csv".to_string(),
            state_file: "state.json".to_string(),
            item_file_prefix: "records_".to_string(),
            batch_size: 50,
        }
    }
}

impl OutputConfig {
    pub fn aggregate_path(&self) -> PathBuf {
        self.dir.join(&self.aggregate_file)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(&self.state_file)
    }

    /// Path of the per-item file for an already sanitized term
    pub fn item_path(&self, term_safe: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}.csv", self.item_file_prefix, term_safe))
    }
}

/// Run-level budgets and pacing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RunConfig {
    /// Wall-clock budget for one run (seconds)
    pub max_runtime_secs: u64,

    /// Maximum work items processed in one run
    pub max_items_per_run: usize,

    /// Pause between consecutive work items (milliseconds)
    pub item_throttle_ms: u64,

    /// Pause after a failed work item (milliseconds)
    pub failure_cooldown_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_runtime_secs: 10 * 3600,
            max_items_per_run: 10_000,
            item_throttle_ms: 600,
            failure_cooldown_ms: 5000,
        }
    }
}

/// Which record filter to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    /// Accept any record with non-blank text
    Any,
    /// Accept text containing marker characters
    Markers,
}

/// Record filter configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FilterConfig {
    pub kind: FilterKind,

    /// Marker alphabet used by the `markers` filter
    pub markers: String,

    /// Minimum marker characters required for acceptance
    pub min_markers: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: FilterKind::Markers,
            markers: crate::filter::VIETNAMESE_MARKERS.to_string(),
            min_markers: 2,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct UserAgentConfig {
    /// Name of the harvester
    pub crawler_name: String,

    /// Version of the harvester
    pub crawler_version: String,

    /// URL with information about the harvester
    pub contact_url: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "snap-harvest".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/snap-harvest".to_string(),
        }
    }
}

impl UserAgentConfig {
    /// Format: Mozilla/5.0 (compatible; Name/Version; +ContactURL)
    pub fn header_value(&self) -> String {
        format!(
            "Mozilla/5.0 (compatible; {}/{}; +{})",
            self.crawler_name, self.crawler_version, self.contact_url
        )
    }
}

fn default_access_token_env() -> String {
    "HARVEST_ACCESS_TOKEN".to_string()
}

fn default_token_param() -> String {
    "access_token".to_string()
}

fn default_term_param() -> String {
    "search_terms".to_string()
}

fn default_page_limit() -> u32 {
    50
}

fn default_max_pages() -> u32 {
    5
}

fn default_fields() -> Vec<String> {
    [
        "id",
        "page_id",
        "page_name",
        "ad_snapshot_url",
        "ad_creative_body",
        "ad_creative_link_title",
        "ad_creative_link_description",
        "ad_creative_link_caption",
        "spend",
        "impressions",
        "currency",
    ]
    .iter()
    .map(|f| f.to_string())
    .collect()
}

impl Config {
    /// Builds a configuration with defaults for everything but the terms and endpoint
    pub fn with_terms(endpoint: impl Into<String>, terms: Vec<String>) -> Self {
        Self {
            work: WorkConfig { terms },
            source: SourceConfig {
                endpoint: endpoint.into(),
                access_token_env: default_access_token_env(),
                token_param: default_token_param(),
                term_param: default_term_param(),
                page_limit: default_page_limit(),
                max_pages: default_max_pages(),
                fields: default_fields(),
                params: BTreeMap::new(),
            },
            retry: RetryConfig::default(),
            capture: CaptureConfig::default(),
            output: OutputConfig::default(),
            run: RunConfig::default(),
            filter: FilterConfig::default(),
            user_agent: UserAgentConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Optional persistent log file, in addition to stderr
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoggingConfig {
    /// Log file path; rotated daily with the date appended. `None` logs to stderr only
    pub file: Option<PathBuf>,

    /// Rotated log files kept before the oldest is deleted
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            max_files: 5,
        }
    }
}
