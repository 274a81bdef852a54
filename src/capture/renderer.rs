//! Renderer seam used by the rendered-capture fallback

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a renderer
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer failed to launch: {0}")]
    Launch(String),

    #[error("renderer is not available")]
    Unavailable,

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("nothing has been loaded yet")]
    NotNavigated,

    #[error("condition {condition} not met within {waited:?}")]
    Timeout {
        condition: ReadyCondition,
        waited: Duration,
    },

    #[error("invalid condition {condition}: {message}")]
    InvalidCondition {
        condition: ReadyCondition,
        message: String,
    },

    #[error("full-page capture failed: {0}")]
    Capture(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Readiness signal awaited after navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyCondition {
    /// An element matching the CSS selector is present
    ElementPresent(String),
}

impl ReadyCondition {
    pub fn element(selector: impl Into<String>) -> Self {
        Self::ElementPresent(selector.into())
    }
}

impl fmt::Display for ReadyCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElementPresent(selector) => write!(f, "element '{}' present", selector),
        }
    }
}

/// A page-rendering resource
///
/// Implementations hold whatever heavy state rendering needs (a browser
/// process, a page handle); the capturer disposes and relaunches them
/// periodically to bound resource growth.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Loads `url`
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError>;

    /// Waits until `condition` holds for the loaded page, at most `timeout`
    async fn wait_for(
        &mut self,
        condition: &ReadyCondition,
        timeout: Duration,
    ) -> Result<(), RenderError>;

    /// Captures the whole loaded page to `dest` and returns the written path
    async fn capture_full_page(&mut self, dest: &Path) -> Result<PathBuf, RenderError>;

    /// File extension of captures produced by [`capture_full_page`](Self::capture_full_page)
    fn capture_extension(&self) -> &'static str {
        "png"
    }

    /// Releases the underlying resource; must not fail
    async fn dispose(&mut self);
}

/// Launches fresh [`Renderer`] instances
#[async_trait]
pub trait RendererFactory: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Renderer>, RenderError>;
}
