//! Conversion orchestrator: drive one document from `pending` to a terminal
//! state.
//!
//! ## Run sequence
//!
//! ```text
//! load source ─▶ start_validation ─┬─ blank ──────────────▶ validation_fail
//!                                  ├─ validator fails ─────▶ validation_fail
//!                                  └─ ok ─▶ validation_succeed ─▶ render ─▶ attach ─▶ complete
//! ```
//!
//! Exactly one validator runs per document, chosen by
//! [`RunOptions::use_ai_repair`]. Every transition is persisted before the
//! next step starts, so a crash mid-run leaves the document in the last
//! state it actually reached.
//!
//! Any error in the sequence lands in one place, [`Converter::run`], which
//! marks the document `failed` unless it already reached a terminal state.
//! A more specific `validation_failed` is never overwritten.

use crate::config::{PageOverrides, PipelineConfig, WatermarkOverrides};
use crate::document::{Document, Status, Transition};
use crate::error::{ConversionError, EngineError, RenderError, ValidationError};
use crate::pipeline::render::Renderer;
use crate::pipeline::repair::RepairValidator;
use crate::pipeline::validate::StructuralValidator;
use crate::progress::{ConversionObserver, NoopObserver};
use crate::store::{AttachmentStore, DocumentRepository};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Validate through the AI repair oracle instead of the strict parser.
    pub use_ai_repair: bool,
}

/// The two mutually exclusive validation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Structural,
    AiRepair,
}

impl From<RunOptions> for ValidationMode {
    fn from(options: RunOptions) -> Self {
        if options.use_ai_repair {
            ValidationMode::AiRepair
        } else {
            ValidationMode::Structural
        }
    }
}

/// What a successful call to [`Converter::run`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The document went all the way to `completed`.
    Completed,
    /// The document was already terminal; nothing was touched.
    Skipped(Status),
}

/// Content that passed validation, plus the oracle's review if any.
struct Validated {
    content: Vec<u8>,
    repaired: bool,
    review: Option<(Vec<String>, Vec<String>)>,
}

/// The orchestrator.
pub struct Converter {
    store: Arc<dyn AttachmentStore>,
    repository: Arc<dyn DocumentRepository>,
    structural: StructuralValidator,
    repair: RepairValidator,
    renderer: Renderer,
    watermark: WatermarkOverrides,
    page: PageOverrides,
    observer: Arc<dyn ConversionObserver>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("renderer", &self.renderer)
            .field("repair", &self.repair)
            .field("watermark", &self.watermark)
            .field("page", &self.page)
            .finish_non_exhaustive()
    }
}

impl Converter {
    /// A converter with the default run watermark and page margins and no
    /// AI oracle configured.
    pub fn new(
        store: Arc<dyn AttachmentStore>,
        repository: Arc<dyn DocumentRepository>,
        renderer: Renderer,
    ) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            store,
            repository,
            structural: StructuralValidator::new(),
            repair: RepairValidator::unconfigured("OpenRouter API key not configured"),
            renderer,
            watermark: defaults.watermark,
            page: defaults.page,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Wire every stage from `config`.
    pub fn from_config(
        config: &PipelineConfig,
        store: Arc<dyn AttachmentStore>,
        repository: Arc<dyn DocumentRepository>,
    ) -> Result<Self, EngineError> {
        let renderer = Renderer::from_config(config)?;
        Ok(Self::new(store, repository, renderer)
            .with_repair(RepairValidator::from_config(&config.oracle))
            .with_watermark(config.watermark.clone())
            .with_page(config.page))
    }

    pub fn with_repair(mut self, repair: RepairValidator) -> Self {
        self.repair = repair;
        self
    }

    pub fn with_watermark(mut self, watermark: WatermarkOverrides) -> Self {
        self.watermark = watermark;
        self
    }

    pub fn with_page(mut self, page: PageOverrides) -> Self {
        self.page = page;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConversionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn repository(&self) -> &Arc<dyn DocumentRepository> {
        &self.repository
    }

    pub fn store(&self) -> &Arc<dyn AttachmentStore> {
        &self.store
    }

    /// Convert `document`, persisting every state change.
    ///
    /// A document that is already terminal is left alone and reported as
    /// [`RunOutcome::Skipped`], which makes a redelivered job harmless.
    ///
    /// # Errors
    /// The error that ended the run. By the time it is returned the document
    /// is in a terminal state and has been saved (unless saving is what
    /// failed).
    pub async fn run(
        &self,
        document: &mut Document,
        options: RunOptions,
    ) -> Result<RunOutcome, ConversionError> {
        let id = document.id();
        if document.status().is_terminal() {
            info!("Document {} already {}; skipping", id, document.status());
            return Ok(RunOutcome::Skipped(document.status()));
        }

        let start = Instant::now();
        let mode = ValidationMode::from(options);
        info!("Converting document {} ({:?} validation)", id, mode);

        match self.execute(document, mode).await {
            Ok(()) => {
                info!(
                    "Document {} completed in {}ms",
                    id,
                    start.elapsed().as_millis()
                );
                self.observer.on_finished(id, document.status(), None);
                Ok(RunOutcome::Completed)
            }
            Err(e) => {
                error!("Document {} conversion failed: {}", id, e);
                self.mark_failed(document).await;
                let message = e.to_string();
                self.observer
                    .on_finished(id, document.status(), Some(&message));
                Err(e)
            }
        }
    }

    /// Move a non-terminal document to `failed` and save it. Never errors:
    /// this runs while another error is already being reported.
    pub(crate) async fn mark_failed(&self, document: &mut Document) {
        let from = document.status();
        if from.is_terminal() {
            return;
        }
        match document.transition(Transition::Fail) {
            Ok(to) => {
                if let Err(e) = self.repository.save(document).await {
                    error!("Document {}: could not persist failure: {}", document.id(), e);
                }
                self.observer.on_transition(document.id(), from, to);
            }
            Err(e) => error!("Document {}: {}", document.id(), e),
        }
    }

    async fn execute(&self, document: &mut Document, mode: ValidationMode) -> Result<(), ConversionError> {
        let source = self.store.read(document.source()).await?;

        self.apply(document, Transition::StartValidation).await?;

        if source.iter().all(u8::is_ascii_whitespace) {
            self.apply(document, Transition::ValidationFail).await?;
            return Err(ConversionError::BlankContent);
        }

        let validated = match self.validate(&source, mode).await {
            Ok(v) => v,
            Err(e) => {
                self.apply(document, Transition::ValidationFail).await?;
                return Err(ConversionError::Validation(e));
            }
        };
        if let Some((issues, warnings)) = validated.review {
            document.record_review(issues, warnings);
        }
        self.apply(document, Transition::ValidationSucceed).await?;
        self.observer.on_validated(document.id(), validated.repaired);

        let pdf = match self
            .renderer
            .render(&validated.content, &self.watermark, &self.page)
            .await
        {
            Ok(pdf) if !pdf.is_empty() => pdf,
            Ok(_) | Err(RenderError::EmptyOutput) => return Err(ConversionError::EmptyOutput),
            Err(e) => return Err(e.into()),
        };
        self.observer.on_rendered(document.id(), pdf.len());

        let filename = generated_filename(document.original_filename(), Utc::now().timestamp());
        let attachment = self
            .store
            .attach(pdf, &filename, "application/pdf")
            .await?;

        let from = document.status();
        let mut completed = document.clone();
        let to = completed.complete(attachment, filename)?;
        self.repository.save(&completed).await?;
        *document = completed;
        self.observer.on_transition(document.id(), from, to);
        Ok(())
    }

    async fn validate(&self, source: &[u8], mode: ValidationMode) -> Result<Validated, ValidationError> {
        match mode {
            ValidationMode::Structural => {
                let content = self.structural.validate(source)?;
                Ok(Validated {
                    content: content.into_bytes(),
                    repaired: false,
                    review: None,
                })
            }
            ValidationMode::AiRepair => {
                let report = self.repair.validate_and_repair(source).await?;
                if report.fixed {
                    warn!("AI repair rewrote the SVG: {}", report.issues.join("; "));
                }
                Ok(Validated {
                    content: report.content.into_bytes(),
                    repaired: report.fixed,
                    review: Some((report.issues, report.warnings)),
                })
            }
        }
    }

    async fn apply(&self, document: &mut Document, transition: Transition) -> Result<(), ConversionError> {
        let from = document.status();
        let mut next = document.clone();
        let to = next.transition(transition)?;
        // The caller's copy only moves once the new state is stored.
        self.repository.save(&next).await?;
        *document = next;
        self.observer.on_transition(document.id(), from, to);
        Ok(())
    }
}

/// `<original basename without extension>_<unix timestamp>.pdf`
///
/// Only the last extension is dropped, so `my-complex_file.name.svg`
/// becomes `my-complex_file.name_<ts>.pdf`.
pub fn generated_filename(original: &str, timestamp: i64) -> String {
    let stem = Path::new(original)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "document".to_string());
    format!("{stem}_{timestamp}.pdf")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_filename_keeps_inner_dots() {
        assert_eq!(
            generated_filename("my-complex_file.name.svg", 1234567890),
            "my-complex_file.name_1234567890.pdf"
        );
    }

    #[test]
    fn generated_filename_without_extension() {
        assert_eq!(generated_filename("test_image", 42), "test_image_42.pdf");
    }

    #[test]
    fn generated_filename_drops_directories() {
        assert_eq!(
            generated_filename("uploads/2024/logo.svg", 7),
            "logo_7.pdf"
        );
    }

    #[test]
    fn generated_filename_falls_back_for_empty_stem() {
        assert_eq!(generated_filename("", 1), "document_1.pdf");
    }

    #[test]
    fn validation_mode_follows_flag() {
        assert_eq!(
            ValidationMode::from(RunOptions::default()),
            ValidationMode::Structural
        );
        assert_eq!(
            ValidationMode::from(RunOptions {
                use_ai_repair: true
            }),
            ValidationMode::AiRepair
        );
    }
}
