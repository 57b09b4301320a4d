//! Error types for the edgequake-svg2pdf library.
//!
//! Every pipeline stage owns one error enum, and every core operation returns
//! `Result<T, StageError>` so callers must handle both branches explicitly:
//!
//! * [`ValidationError`]: structural or AI-repair validation failed.
//! * [`BuildError`]: the HTML page could not be composed.
//! * [`RenderError`] / [`EngineError`]: the page could not be printed.
//! * [`StateError`]: a lifecycle transition was attempted along an edge
//!   that does not exist. Always a programming-contract violation.
//! * [`InputError`]: a required field was blank at creation time.
//! * [`StoreError`] / [`DispatchError`]: attachment, repository or queue
//!   plumbing failed.
//!
//! [`ConversionError`] is the orchestrator's error. It is the single place
//! where a stage failure becomes a terminal document state, and its
//! `Display` text is what clients eventually see.

use crate::document::{DocumentId, Status, Transition};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ── Validation ───────────────────────────────────────────────────────────────

/// Failures of either validator (structural or AI repair).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Content is empty or whitespace only.
    #[error("Empty SVG content")]
    EmptyContent,

    /// Strict XML parsing rejected the content.
    #[error("Invalid XML structure: {detail}")]
    MalformedStructure { detail: String },

    /// The repair oracle has no credential / provider to talk to.
    #[error("Repair oracle is not configured: {hint}")]
    ConfigurationError { hint: String },

    /// Content is blank or does not look like SVG at all.
    #[error("Invalid SVG content")]
    InvalidInput,

    /// The oracle answered with a non-2xx status or could not be reached.
    #[error("API request failed: {detail}")]
    UpstreamError { detail: String },

    /// The oracle reply is not JSON or lacks the repaired content.
    #[error("Invalid response format from repair oracle: {detail}")]
    ResponseParseError { detail: String },
}

// ── Composition / rendering ──────────────────────────────────────────────────

/// Failures while composing the printable HTML page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("SVG content is blank")]
    EmptyContent,

    #[error("Watermark text is blank")]
    EmptyWatermarkText,

    /// Any other composition fault, carrying its message.
    #[error("HTML composition failed: {0}")]
    Composition(String),
}

/// Faults raised by a rendering engine backend.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No engine could be reached (binary missing, endpoint unset).
    #[error("Rendering engine unavailable: {0}")]
    Unavailable(String),

    /// The engine did not answer within the hard timeout.
    #[error("Rendering engine timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The local engine process exited unsuccessfully or produced no file.
    #[error("Rendering engine process failed: {0}")]
    Process(String),

    /// The remote engine answered with an error.
    #[error("Remote rendering engine error: {0}")]
    Remote(String),

    #[error("I/O error while rendering: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of [`crate::pipeline::render::Renderer::render`].
#[derive(Debug, Error)]
pub enum RenderError {
    /// The template builder failed or produced an empty page.
    #[error("Template build failed: {reason}")]
    TemplateBuildFailed { reason: String },

    /// The engine succeeded but returned zero bytes.
    #[error("Empty PDF content returned by rendering engine")]
    EmptyOutput,

    #[error(transparent)]
    EngineError(#[from] EngineError),
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

/// Lifecycle contract violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// No edge `(from, transition)` exists in the transition table.
    #[error("Document {id}: cannot {transition} from '{from}'")]
    InvalidTransition {
        id: DocumentId,
        from: Status,
        transition: Transition,
    },

    /// A persisted status string is not one of the defined states.
    #[error("Unknown document status '{0}'")]
    UnknownStatus(String),

    #[error("Unknown transition '{0}'")]
    UnknownTransition(String),

    /// `completed` and the generated attachment must appear together.
    #[error("Document {id}: generated file must be present if and only if status is completed")]
    GeneratedFileMismatch { id: DocumentId },
}

// ── Input / creation ─────────────────────────────────────────────────────────

/// A single creation-time input problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Svg file can't be blank")]
    MissingSource,

    #[error("Original file name can't be blank")]
    MissingFilename,
}

/// Every input problem found at creation time, in discovery order.
///
/// This is the body an HTTP layer answers with a `422`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputErrors(pub Vec<InputError>);

impl InputErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, error: InputError) {
        self.0.push(error);
    }

    /// Human-readable messages, one per problem.
    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), InputErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for InputErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join(", "))
    }
}

impl std::error::Error for InputErrors {}

// ── Plumbing ─────────────────────────────────────────────────────────────────

/// Attachment store and repository failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Attachment '{key}' not found")]
    AttachmentNotFound { key: String },

    #[error("Document {0} not found")]
    DocumentNotFound(DocumentId),

    #[error("Storage I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Job queue failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("Job queue is closed; document {0} was not enqueued")]
    QueueClosed(DocumentId),
}

/// Configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid length '{0}': expected a number followed by mm, cm, in, px or pt")]
    InvalidLength(String),
}

// ── Orchestration ────────────────────────────────────────────────────────────

/// Everything that can end a conversion run unsuccessfully.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Source content was blank; detected before any validator ran.
    #[error("SVG content is blank")]
    BlankContent,

    #[error("SVG validation failed: {0}")]
    Validation(ValidationError),

    #[error("PDF generation failed: {0}")]
    Render(#[from] RenderError),

    /// The renderer reported success with zero bytes.
    #[error("Empty PDF content")]
    EmptyOutput,

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The worker running the conversion panicked or was cancelled.
    #[error("Conversion worker crashed: {0}")]
    WorkerCrashed(String),
}

/// Failures surfaced by [`crate::service::DocumentService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Invalid(InputErrors),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl ServiceError {
    /// The HTTP status an HTTP layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Invalid(_) => 422,
            ServiceError::Store(StoreError::DocumentNotFound(_)) => 404,
            ServiceError::Store(_) | ServiceError::Dispatch(_) => 500,
        }
    }
}
