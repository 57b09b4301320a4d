//! # edgequake-svg2pdf
//!
//! Turn uploaded SVG files into watermarked PDF documents through a
//! state-tracked, observable pipeline.
//!
//! Each upload becomes a [`Document`] that moves through an explicit
//! lifecycle (`pending → validating → processing → completed`, with
//! `validation_failed` and `failed` as the failure exits). The orchestrator
//! validates the SVG, lays it out on an A4 page under a tiled watermark,
//! prints it with headless Chrome and attaches the PDF to the document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Accept    DocumentService::create: store source, persist `pending`, enqueue
//!  ├─ 2. Validate  strict XML parse, or AI repair through an LLM oracle
//!  ├─ 3. Compose   HTML page: header, centred SVG, footer, watermark overlay
//!  ├─ 4. Print     local Chrome (--print-to-pdf) or remote browserless /pdf
//!  └─ 5. Attach    `<name>_<unix ts>.pdf`, status `completed`
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_svg2pdf::{
//!     Converter, Dispatcher, DocumentService, MemoryAttachmentStore,
//!     MemoryDocumentRepository, PipelineConfigBuilder, Upload,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // CHROME_PATH / REMOTE_CHROME_URL / OPENROUTER_API_KEY are honoured.
//!     let config = PipelineConfigBuilder::from_env().build()?;
//!     let store = Arc::new(MemoryAttachmentStore::new());
//!     let repository = Arc::new(MemoryDocumentRepository::new());
//!
//!     let converter = Arc::new(Converter::from_config(&config, store.clone(), repository.clone())?);
//!     let dispatcher = Dispatcher::start(converter, config.concurrency);
//!     let service = DocumentService::new(store, repository, Arc::new(dispatcher.handle()));
//!
//!     let view = service
//!         .create(Upload {
//!             filename: Some("logo.svg".into()),
//!             bytes: Some(std::fs::read("logo.svg")?),
//!             use_ai_repair: false,
//!         })
//!         .await?;
//!
//!     let id = view.id;
//!     drop(service);
//!     dispatcher.shutdown().await;
//!     println!("{:?}", id);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `svg2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-svg2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod jobs;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod service;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    EngineTarget, Length, LengthUnit, MarginOverrides, Margins, OracleConfig, PageChrome,
    PageConfig, PageOverrides, PipelineConfig, PipelineConfigBuilder, Size, SizeOverrides,
    WatermarkConfig, WatermarkOverrides,
};
pub use convert::{generated_filename, Converter, RunOptions, RunOutcome, ValidationMode};
pub use document::{Document, DocumentId, Status, StatusChange, Transition};
pub use error::{
    BuildError, ConfigError, ConversionError, DispatchError, EngineError, InputError, InputErrors,
    RenderError, ServiceError, StateError, StoreError, ValidationError,
};
pub use jobs::{perform, ConversionJob, Dispatcher, DispatcherHandle, JobQueue};
pub use pipeline::engine::{LocalChrome, PrintOptions, RemoteChrome, RenderEngine};
pub use pipeline::render::Renderer;
pub use pipeline::repair::{OpenRouterOracle, ProviderOracle, RepairOracle, RepairReport, RepairValidator};
pub use pipeline::template::TemplateBuilder;
pub use pipeline::validate::StructuralValidator;
pub use pipeline::watermark::WatermarkPattern;
pub use progress::{ConversionObserver, NoopObserver, ProgressObserver};
pub use service::{DocumentService, DocumentView, Upload};
pub use store::{
    AttachmentRef, AttachmentStore, DocumentRepository, FsAttachmentStore, MemoryAttachmentStore,
    MemoryDocumentRepository,
};
