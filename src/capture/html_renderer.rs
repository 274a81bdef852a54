//! Built-in renderer that captures the served HTML document
//!
//! It loads pages over HTTP and evaluates readiness selectors against the
//! parsed DOM. A static document is either ready at load time or never, so
//! readiness is decided without polling. Captures are `.html` snapshots of
//! the document as served.

use crate::capture::renderer::{ReadyCondition, RenderError, Renderer, RendererFactory};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Renderer backed by plain HTTP fetches and an HTML parser
pub struct HtmlRenderer {
    client: Client,
    url: Option<String>,
    document: Option<String>,
}

impl HtmlRenderer {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            url: None,
            document: None,
        }
    }
}

#[async_trait]
impl Renderer for HtmlRenderer {
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        self.url = None;
        self.document = None;

        let navigation_error = |message: String| RenderError::Navigation {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| navigation_error(e.without_url().to_string()))?;

        if !response.status().is_success() {
            return Err(navigation_error(format!("HTTP {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| navigation_error(e.without_url().to_string()))?;

        self.url = Some(url.to_string());
        self.document = Some(body);
        Ok(())
    }

    async fn wait_for(
        &mut self,
        condition: &ReadyCondition,
        timeout: Duration,
    ) -> Result<(), RenderError> {
        let document = self.document.as_deref().ok_or(RenderError::NotNavigated)?;

        if condition_holds(document, condition)? {
            Ok(())
        } else {
            Err(RenderError::Timeout {
                condition: condition.clone(),
                waited: timeout,
            })
        }
    }

    async fn capture_full_page(&mut self, dest: &Path) -> Result<PathBuf, RenderError> {
        let document = self.document.as_deref().ok_or(RenderError::NotNavigated)?;
        tokio::fs::write(dest, document.as_bytes()).await?;
        Ok(dest.to_path_buf())
    }

    fn capture_extension(&self) -> &'static str {
        "html"
    }

    async fn dispose(&mut self) {
        if let Some(url) = self.url.take() {
            tracing::trace!("Disposing HTML renderer (last page {})", url);
        }
        self.document = None;
    }
}

/// Evaluates a readiness condition against a document
///
/// Kept synchronous so the parsed DOM never lives across an await point.
fn condition_holds(document: &str, condition: &ReadyCondition) -> Result<bool, RenderError> {
    match condition {
        ReadyCondition::ElementPresent(selector) => {
            let parsed = Selector::parse(selector).map_err(|e| RenderError::InvalidCondition {
                condition: condition.clone(),
                message: format!("{:?}", e),
            })?;
            let html = Html::parse_document(document);
            let found = html.select(&parsed).next().is_some();
            Ok(found)
        }
    }
}

/// Factory for [`HtmlRenderer`] instances sharing one HTTP client
#[derive(Clone)]
pub struct HtmlRendererFactory {
    client: Client,
}

impl HtmlRendererFactory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RendererFactory for HtmlRendererFactory {
    async fn launch(&self) -> Result<Box<dyn Renderer>, RenderError> {
        Ok(Box::new(HtmlRenderer::new(self.client.clone())))
    }
}
