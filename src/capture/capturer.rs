//! Ordered-strategy snapshot capturer
//!
//! Each record names at most one remote resource. The capturer tries, in
//! order:
//!
//! 1. `DirectDownload`: when the URL path ends in a known image extension,
//!    stream it to disk, provided the server answers with an `image/*`
//!    content type
//! 2. `ProbedDownload`: send a header-only probe and stream the body only if
//!    the probe reports an `image/*` content type
//! 3. `RenderedCapture`: load the URL in the renderer, wait for an image
//!    element (short) or the body (longer), settle, then capture the page
//!
//! The first strategy producing a file wins. Free capacity is checked before
//! any strategy runs.

use crate::capture::renderer::{ReadyCondition, RenderError, Renderer, RendererFactory};
use crate::capture::CaptureError;
use crate::config::CaptureConfig;
use crate::guard::{CapacityExceeded, ResourceGuard};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

/// URL path extensions that qualify for a direct download
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// One capture strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStep {
    DirectDownload,
    ProbedDownload,
    RenderedCapture,
}

impl CaptureStep {
    /// The default strategy order
    pub fn default_order() -> Vec<CaptureStep> {
        vec![
            CaptureStep::DirectDownload,
            CaptureStep::ProbedDownload,
            CaptureStep::RenderedCapture,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureStep::DirectDownload => "direct-download",
            CaptureStep::ProbedDownload => "probed-download",
            CaptureStep::RenderedCapture => "rendered-capture",
        }
    }
}

impl fmt::Display for CaptureStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an artifact was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactSource {
    DirectDownload,
    RenderedCapture,
}

impl ArtifactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactSource::DirectDownload => "direct-download",
            ArtifactSource::RenderedCapture => "rendered-capture",
        }
    }
}

impl fmt::Display for ArtifactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file written for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedArtifact {
    pub record_id: String,
    pub local_path: PathBuf,
    pub source: ArtifactSource,
}

/// Result of one capture request
#[derive(Debug)]
pub enum CaptureOutcome {
    Captured(CapturedArtifact),
    /// The record names no resource
    Skipped,
    /// Free space is below the threshold; nothing was attempted
    InsufficientCapacity(CapacityExceeded),
    /// Every strategy failed
    Failed,
}

impl CaptureOutcome {
    pub fn artifact(&self) -> Option<&CapturedArtifact> {
        match self {
            CaptureOutcome::Captured(artifact) => Some(artifact),
            _ => None,
        }
    }
}

/// Timeouts and thresholds used by the capturer
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub min_free_bytes: u64,
    pub probe_timeout: Duration,
    pub download_timeout: Duration,
    pub content_ready_timeout: Duration,
    pub page_ready_timeout: Duration,
    pub settle: Duration,
}

impl CaptureSettings {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            min_free_bytes: config.min_free_bytes(),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            download_timeout: Duration::from_secs(config.download_timeout_secs),
            content_ready_timeout: Duration::from_millis(config.content_ready_timeout_ms),
            page_ready_timeout: Duration::from_millis(config.page_ready_timeout_ms),
            settle: Duration::from_millis(config.settle_ms),
        }
    }
}

/// Produces local artifacts and owns the renderer lifecycle
///
/// Artifacts are written under the guard's root as
/// `<artifact_id>.<extension>`.
pub struct SnapshotCapturer {
    client: Client,
    guard: ResourceGuard,
    factory: Box<dyn RendererFactory>,
    renderer: Option<Box<dyn Renderer>>,
    steps: Vec<CaptureStep>,
    settings: CaptureSettings,
}

impl SnapshotCapturer {
    pub fn new(
        client: Client,
        guard: ResourceGuard,
        factory: Box<dyn RendererFactory>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            client,
            guard,
            factory,
            renderer: None,
            steps: CaptureStep::default_order(),
            settings,
        }
    }

    /// Replaces the strategy order
    pub fn with_steps(mut self, steps: Vec<CaptureStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn steps(&self) -> &[CaptureStep] {
        &self.steps
    }

    /// Directory receiving artifacts
    pub fn artifacts_dir(&self) -> &Path {
        self.guard.root()
    }

    pub fn renderer_active(&self) -> bool {
        self.renderer.is_some()
    }

    /// Launches the renderer if none is running
    pub async fn start_renderer(&mut self) -> Result<(), RenderError> {
        if self.renderer.is_none() {
            self.renderer = Some(self.factory.launch().await?);
            tracing::debug!("Renderer launched");
        }
        Ok(())
    }

    /// Disposes the current renderer and launches a fresh one
    ///
    /// If the relaunch fails the capturer carries on without a renderer and
    /// launches one lazily the next time a rendered capture is needed.
    pub async fn restart_renderer(&mut self) -> Result<(), RenderError> {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.dispose().await;
        }
        match self.factory.launch().await {
            Ok(renderer) => {
                self.renderer = Some(renderer);
                tracing::info!("Renderer restarted");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Renderer relaunch failed, will retry on demand: {}", e);
                Err(e)
            }
        }
    }

    /// Disposes the renderer; safe to call more than once
    pub async fn shutdown(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.dispose().await;
            tracing::debug!("Renderer disposed");
        }
    }

    /// Captures the resource of one record
    ///
    /// # Arguments
    ///
    /// * `record_id` - Id of the record the artifact belongs to
    /// * `resource_url` - The record's resource, if any
    /// * `artifact_id` - File stem for the artifact
    pub async fn capture(
        &mut self,
        record_id: &str,
        resource_url: Option<&str>,
        artifact_id: &str,
    ) -> CaptureOutcome {
        let Some(url) = resource_url.map(str::trim).filter(|u| !u.is_empty()) else {
            return CaptureOutcome::Skipped;
        };

        if let Err(e) = self.guard.check_capacity(self.settings.min_free_bytes) {
            tracing::warn!("Skipping capture for {}: {}", record_id, e);
            return CaptureOutcome::InsufficientCapacity(e);
        }

        let dest_dir = self.guard.root().to_path_buf();
        if let Err(e) = tokio::fs::create_dir_all(&dest_dir).await {
            tracing::warn!(
                "Cannot create artifact directory {}: {}",
                dest_dir.display(),
                e
            );
            return CaptureOutcome::Failed;
        }

        for step in self.steps.clone() {
            let result = match step {
                CaptureStep::DirectDownload => {
                    self.direct_download(url, &dest_dir, artifact_id).await
                }
                CaptureStep::ProbedDownload => {
                    self.probed_download(url, &dest_dir, artifact_id).await
                }
                CaptureStep::RenderedCapture => {
                    self.rendered_capture(url, &dest_dir, artifact_id).await
                }
            };

            match result {
                Ok(local_path) => {
                    let source = match step {
                        CaptureStep::RenderedCapture => ArtifactSource::RenderedCapture,
                        _ => ArtifactSource::DirectDownload,
                    };
                    tracing::debug!(
                        "Captured {} via {} -> {}",
                        record_id,
                        step,
                        local_path.display()
                    );
                    return CaptureOutcome::Captured(CapturedArtifact {
                        record_id: record_id.to_string(),
                        local_path,
                        source,
                    });
                }
                Err(CaptureError::NotApplicable) => {
                    tracing::trace!("{} does not apply to {}", step, record_id);
                }
                Err(e) => {
                    tracing::debug!("{} failed for {}: {}", step, record_id, e);
                }
            }
        }

        tracing::warn!("All capture strategies failed for {}", record_id);
        CaptureOutcome::Failed
    }

    async fn direct_download(
        &self,
        url: &str,
        dest_dir: &Path,
        artifact_id: &str,
    ) -> Result<PathBuf, CaptureError> {
        if !url_has_image_extension(url) {
            return Err(CaptureError::NotApplicable);
        }
        self.download(url, dest_dir, artifact_id).await
    }

    async fn probed_download(
        &self,
        url: &str,
        dest_dir: &Path,
        artifact_id: &str,
    ) -> Result<PathBuf, CaptureError> {
        let response = self
            .client
            .head(url)
            .timeout(self.settings.probe_timeout)
            .send()
            .await
            .map_err(|e| http_error(url, e))?;

        if !response.status().is_success() {
            return Err(CaptureError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let content_type = content_type_of(&response);
        if !is_image_content_type(&content_type) {
            return Err(CaptureError::NotImage {
                url: url.to_string(),
                content_type,
            });
        }

        self.download(url, dest_dir, artifact_id).await
    }

    /// Streams an image body to `<dest_dir>/<artifact_id>.<ext>`
    ///
    /// The extension comes from the response content type. A partially
    /// written file is removed on failure.
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        artifact_id: &str,
    ) -> Result<PathBuf, CaptureError> {
        let mut response = self
            .client
            .get(url)
            .timeout(self.settings.download_timeout)
            .send()
            .await
            .map_err(|e| http_error(url, e))?;

        if !response.status().is_success() {
            return Err(CaptureError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let content_type = content_type_of(&response);
        if !is_image_content_type(&content_type) {
            return Err(CaptureError::NotImage {
                url: url.to_string(),
                content_type,
            });
        }

        let path = dest_dir.join(format!(
            "{}.{}",
            artifact_id,
            content_type_extension(&content_type)
        ));

        if let Err(e) = write_body(&mut response, url, &path).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
        Ok(path)
    }

    async fn rendered_capture(
        &mut self,
        url: &str,
        dest_dir: &Path,
        artifact_id: &str,
    ) -> Result<PathBuf, CaptureError> {
        if self.renderer.is_none() {
            self.start_renderer().await?;
        }
        let Some(renderer) = self.renderer.as_mut() else {
            return Err(RenderError::Unavailable.into());
        };
        let settings = &self.settings;

        bounded(settings.download_timeout, renderer.navigate(url)).await?;

        let content = ReadyCondition::element("img");
        let waited = bounded(
            settings.content_ready_timeout,
            renderer.wait_for(&content, settings.content_ready_timeout),
        )
        .await;
        if let Err(e) = waited {
            tracing::trace!("No image element on {} ({}), waiting for body", url, e);
            let body = ReadyCondition::element("body");
            bounded(
                settings.page_ready_timeout,
                renderer.wait_for(&body, settings.page_ready_timeout),
            )
            .await?;
        }

        tokio::time::sleep(settings.settle).await;

        let dest = dest_dir.join(format!("{}.{}", artifact_id, renderer.capture_extension()));
        let path = bounded(settings.download_timeout, renderer.capture_full_page(&dest)).await?;
        Ok(path)
    }
}

/// Runs a renderer call under a hard deadline
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, RenderError>>,
) -> Result<T, CaptureError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(CaptureError::from),
        Err(_) => Err(CaptureError::Timeout {
            step: CaptureStep::RenderedCapture,
            after: limit,
        }),
    }
}

async fn write_body(response: &mut Response, url: &str, path: &Path) -> Result<(), CaptureError> {
    let mut file = tokio::fs::File::create(path).await?;
    while let Some(chunk) = response.chunk().await.map_err(|e| http_error(url, e))? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

fn http_error(url: &str, error: reqwest::Error) -> CaptureError {
    CaptureError::Http {
        url: url.to_string(),
        message: error.without_url().to_string(),
    }
}

fn content_type_of(response: &Response) -> String {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// True for `image/*` media types, ignoring case and parameters
pub fn is_image_content_type(content_type: &str) -> bool {
    media_type(content_type).starts_with("image/")
}

/// File extension derived from an image content type
///
/// `image/jpeg` becomes `jpeg` and `image/svg+xml` becomes `svg`; anything
/// unusable falls back to `img`.
pub fn content_type_extension(content_type: &str) -> String {
    let media = media_type(content_type);
    let subtype = media
        .split_once('/')
        .map(|(_, sub)| sub)
        .unwrap_or("")
        .split('+')
        .next()
        .unwrap_or("");

    let cleaned: String = subtype
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();

    if cleaned.is_empty() {
        "img".to_string()
    } else {
        cleaned
    }
}

/// True when the URL path ends in one of [`IMAGE_EXTENSIONS`]
pub fn url_has_image_extension(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let path = parsed.path().to_ascii_lowercase();
    let Some((_, extension)) = path.rsplit_once('.') else {
        return false;
    };
    IMAGE_EXTENSIONS.contains(&extension)
}

fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}
