//! Snapshot capture
//!
//! # Components
//!
//! - `SnapshotCapturer`: produces one local artifact per record, trying an
//!   ordered list of strategies
//! - `Renderer` / `RendererFactory`: the page-rendering resource used by the
//!   last-resort strategy
//! - `HtmlRenderer`: built-in renderer that snapshots the served document

mod capturer;
mod html_renderer;
mod renderer;

pub use capturer::{
    content_type_extension, is_image_content_type, url_has_image_extension, ArtifactSource,
    CaptureOutcome, CaptureSettings, CaptureStep, CapturedArtifact, SnapshotCapturer,
    IMAGE_EXTENSIONS,
};
pub use html_renderer::{HtmlRenderer, HtmlRendererFactory};
pub use renderer::{ReadyCondition, RenderError, Renderer, RendererFactory};

use thiserror::Error;

/// Reasons a single capture strategy did not produce an artifact
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("strategy does not apply to this resource")]
    NotApplicable,

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} is not an image (content-type: {content_type})")]
    NotImage { url: String, content_type: String },

    #[error("{step} timed out after {after:?}")]
    Timeout {
        step: CaptureStep,
        after: std::time::Duration,
    },

    #[error("renderer error: {0}")]
    Render(#[from] RenderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
