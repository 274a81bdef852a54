//! Shared fixtures for the integration tests

use async_trait::async_trait;
use serde_json::{json, Value};
use snap_harvest::capture::{
    CaptureSettings, ReadyCondition, RenderError, Renderer, RendererFactory, SnapshotCapturer,
};
use snap_harvest::config::{Config, FilterKind};
use snap_harvest::filter::build_filter;
use snap_harvest::guard::{ResourceGuard, SpaceProbe};
use snap_harvest::output::OutputRow;
use snap_harvest::source::{FetchClient, FetchSettings, GraphApiSource};
use snap_harvest::Orchestrator;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const ARCHIVE_PATH: &str = "/ads_archive";

/// Space probe reporting a fixed number of free bytes
pub struct FixedSpace(pub u64);

impl SpaceProbe for FixedSpace {
    fn available_bytes(&self, _root: &Path) -> std::io::Result<u64> {
        Ok(self.0)
    }
}

/// Space probe replaying scripted readings, then reporting plenty of space
#[derive(Clone)]
pub struct ScriptedSpace {
    readings: Arc<Mutex<VecDeque<u64>>>,
    pub queries: Arc<AtomicUsize>,
}

impl ScriptedSpace {
    pub fn new(readings: &[u64]) -> Self {
        Self {
            readings: Arc::new(Mutex::new(readings.iter().copied().collect())),
            queries: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl SpaceProbe for ScriptedSpace {
    fn available_bytes(&self, _root: &Path) -> std::io::Result<u64> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.readings.lock().unwrap().pop_front().unwrap_or(u64::MAX))
    }
}

/// Renderer writing a small placeholder file, recording every navigation
pub struct FakeRenderer {
    navigations: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        self.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn wait_for(
        &mut self,
        condition: &ReadyCondition,
        timeout: Duration,
    ) -> Result<(), RenderError> {
        // Behaves like a page without images
        match condition {
            ReadyCondition::ElementPresent(selector) if selector == "img" => {
                Err(RenderError::Timeout {
                    condition: condition.clone(),
                    waited: timeout,
                })
            }
            _ => Ok(()),
        }
    }

    async fn capture_full_page(&mut self, dest: &Path) -> Result<PathBuf, RenderError> {
        std::fs::write(dest, b"rendered")?;
        Ok(dest.to_path_buf())
    }

    async fn dispose(&mut self) {}
}

#[derive(Clone, Default)]
pub struct FakeRendererFactory {
    pub navigations: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl RendererFactory for FakeRendererFactory {
    async fn launch(&self) -> Result<Box<dyn Renderer>, RenderError> {
        Ok(Box::new(FakeRenderer {
            navigations: self.navigations.clone(),
        }))
    }
}

/// Configuration pointing at a mock server, with all pacing disabled
pub fn test_config(dir: &TempDir, server_uri: &str, terms: &[&str]) -> Config {
    let mut config = Config::with_terms(
        format!("{}{}", server_uri, ARCHIVE_PATH),
        terms.iter().map(|t| t.to_string()).collect(),
    );
    config.output.dir = dir.path().join("outputs");
    config.capture.screenshots_dir = dir.path().join("screenshots");
    config.capture.min_free_gb = 0.0;
    config.capture.settle_ms = 0;
    config.capture.content_ready_timeout_ms = 200;
    config.capture.page_ready_timeout_ms = 200;
    config.retry.backoff_base_ms = 1;
    config.retry.backoff_max_ms = 5;
    config.retry.page_delay_ms = 0;
    config.run.item_throttle_ms = 0;
    config.run.failure_cooldown_ms = 0;
    config.filter.kind = FilterKind::Markers;
    config
}

pub fn test_capturer(config: &Config, factory: FakeRendererFactory) -> SnapshotCapturer {
    test_capturer_with_probe(config, factory, Box::new(FixedSpace(u64::MAX)))
}

pub fn test_capturer_with_probe(
    config: &Config,
    factory: FakeRendererFactory,
    probe: Box<dyn SpaceProbe>,
) -> SnapshotCapturer {
    SnapshotCapturer::new(
        reqwest::Client::new(),
        ResourceGuard::new(&config.capture.screenshots_dir, probe),
        Box::new(factory),
        CaptureSettings::from_config(&config.capture),
    )
}

/// Orchestrator over the HTTP source with a fake renderer
pub fn test_orchestrator(
    config: Config,
    factory: FakeRendererFactory,
    shutdown: CancellationToken,
) -> Orchestrator<GraphApiSource> {
    let client = reqwest::Client::new();
    let source = GraphApiSource::new(client, &config.source, "test-token").unwrap();
    let fetcher = FetchClient::new(source, FetchSettings::from_config(&config), shutdown.clone());
    let capturer = test_capturer(&config, factory);
    orchestrator_with(config, fetcher, capturer, shutdown)
}

/// Orchestrator whose capturer sees the given free-space readings
pub fn test_orchestrator_with_probe(
    config: Config,
    factory: FakeRendererFactory,
    probe: Box<dyn SpaceProbe>,
    shutdown: CancellationToken,
) -> Orchestrator<GraphApiSource> {
    let client = reqwest::Client::new();
    let source = GraphApiSource::new(client, &config.source, "test-token").unwrap();
    let fetcher = FetchClient::new(source, FetchSettings::from_config(&config), shutdown.clone());
    let capturer = test_capturer_with_probe(&config, factory, probe);
    orchestrator_with(config, fetcher, capturer, shutdown)
}

fn orchestrator_with(
    config: Config,
    fetcher: FetchClient<GraphApiSource>,
    capturer: SnapshotCapturer,
    shutdown: CancellationToken,
) -> Orchestrator<GraphApiSource> {
    let filter = build_filter(&config.filter);
    Orchestrator::new(config, fetcher, capturer, filter, shutdown)
}

/// One page of the archive API
pub fn page(records: Vec<Value>, next: Option<String>) -> Value {
    match next {
        Some(next) => json!({"data": records, "paging": {"next": next}}),
        None => json!({"data": records}),
    }
}

pub fn ad(id: &str, body: &str, snapshot: Option<String>) -> Value {
    json!({
        "id": id,
        "page_id": "100",
        "page_name": "Cửa hàng",
        "ad_creative_body": body,
        "ad_snapshot_url": snapshot,
        "currency": "VND",
    })
}

pub fn read_rows(path: &Path) -> Vec<OutputRow> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader.deserialize().map(|row| row.unwrap()).collect()
}

pub fn ids(rows: &[OutputRow]) -> Vec<String> {
    rows.iter().map(|row| row.record_id.clone()).collect()
}
