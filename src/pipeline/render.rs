//! Renderer: compose the page, hand it to the engine, check the result.
//!
//! This is the one long-running step of a conversion, so every engine call
//! runs under a hard timeout. An engine that hangs becomes an
//! [`EngineError::Timeout`] instead of a stuck worker.

use crate::config::{PageConfig, PageOverrides, PipelineConfig, WatermarkOverrides};
use crate::error::{EngineError, RenderError};
use crate::pipeline::engine::{engine_from_target, Paper, PrintOptions, RenderEngine};
use crate::pipeline::template::TemplateBuilder;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Turns SVG content into PDF bytes.
pub struct Renderer {
    engine: Arc<dyn RenderEngine>,
    template: TemplateBuilder,
    page_defaults: PageConfig,
    settle: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("engine", &self.engine.name())
            .field("settle", &self.settle)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Renderer {
    pub const DEFAULT_SETTLE: Duration = Duration::from_millis(1000);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(engine: Arc<dyn RenderEngine>, template: TemplateBuilder) -> Self {
        Self {
            engine,
            template,
            page_defaults: PageConfig::default(),
            settle: Self::DEFAULT_SETTLE,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Engine, template and timings from a pipeline configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, EngineError> {
        let engine = engine_from_target(&config.engine)?;
        let template = TemplateBuilder::new(config.watermark_defaults.clone(), config.chrome.clone());
        Ok(Self::new(engine, template)
            .with_settle(Duration::from_millis(config.settle_ms))
            .with_timeout(Duration::from_secs(config.engine_timeout_secs)))
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Render `content` with the given watermark and page overrides.
    ///
    /// Unspecified margins fall back to 20mm on every side.
    ///
    /// # Errors
    /// - [`RenderError::TemplateBuildFailed`] when the page cannot be composed
    /// - [`RenderError::EngineError`] for engine faults, including timeout
    /// - [`RenderError::EmptyOutput`] when the engine returns zero bytes
    pub async fn render(
        &self,
        content: &[u8],
        watermark: &WatermarkOverrides,
        page: &PageOverrides,
    ) -> Result<Vec<u8>, RenderError> {
        let html = self
            .template
            .build(content, watermark)
            .map_err(|e| RenderError::TemplateBuildFailed {
                reason: e.to_string(),
            })?;
        if html.trim().is_empty() {
            return Err(RenderError::TemplateBuildFailed {
                reason: "template produced an empty page".into(),
            });
        }

        let options = PrintOptions {
            paper: Paper::A4,
            margins: self.page_defaults.merged(page).margins,
            print_background: true,
            prefer_css_page_size: false,
            settle: self.settle,
        };
        debug!("Print options: {:?}", options);

        let start = Instant::now();
        let pdf = tokio::time::timeout(self.timeout, self.engine.print_to_pdf(&html, &options))
            .await
            .map_err(|_| EngineError::Timeout {
                secs: self.timeout.as_secs(),
            })??;

        if pdf.is_empty() {
            return Err(RenderError::EmptyOutput);
        }
        info!(
            "{} rendered {} bytes in {}ms",
            self.engine.name(),
            pdf.len(),
            start.elapsed().as_millis()
        );
        Ok(pdf)
    }
}
