//! The document entity and its lifecycle state machine.
//!
//! ## Lifecycle
//!
//! ```text
//! pending ──start_validation──▶ validating ──validation_succeed──▶ processing ──complete──▶ completed
//!                                    │                                  │
//!                                    └──validation_fail──▶ validation_failed
//!                                                                       │
//! pending / validating / processing ──────────fail──────────▶ failed ◀──┘
//! ```
//!
//! Every edge lives in [`TRANSITIONS`]; [`Document::transition`] is the only
//! way to change a status, and an edge missing from the table is a
//! [`StateError`] rather than a silent no-op. Each successful transition
//! emits an audit log line and appends a [`StatusChange`] to the history.

use crate::error::{InputError, InputErrors, StateError};
use crate::store::AttachmentRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Opaque document identifier, assigned by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Status ───────────────────────────────────────────────────────────────────

/// Where a document is in its lifecycle.
///
/// Serialised values are exactly the lowercase snake-case names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    Validating,
    ValidationFailed,
    Processing,
    Completed,
    Failed,
}

impl Status {
    /// Every defined state, in lifecycle order.
    pub const ALL: [Status; 6] = [
        Status::Pending,
        Status::Validating,
        Status::ValidationFailed,
        Status::Processing,
        Status::Completed,
        Status::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Validating => "validating",
            Status::ValidationFailed => "validation_failed",
            Status::Processing => "processing",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }

    /// No edge leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Completed | Status::Failed | Status::ValidationFailed
        )
    }

    /// `failed` or `validation_failed`.
    pub fn is_failure(self) -> bool {
        matches!(self, Status::Failed | Status::ValidationFailed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StateError::UnknownStatus(s.to_string()))
    }
}

// ── Transitions ──────────────────────────────────────────────────────────────

/// Named lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    StartValidation,
    ValidationSucceed,
    ValidationFail,
    Complete,
    Fail,
}

impl Transition {
    pub const ALL: [Transition; 5] = [
        Transition::StartValidation,
        Transition::ValidationSucceed,
        Transition::ValidationFail,
        Transition::Complete,
        Transition::Fail,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Transition::StartValidation => "start_validation",
            Transition::ValidationSucceed => "validation_succeed",
            Transition::ValidationFail => "validation_fail",
            Transition::Complete => "complete",
            Transition::Fail => "fail",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transition {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Transition::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StateError::UnknownTransition(s.to_string()))
    }
}

/// The complete transition table: `(from, transition, to)`.
pub const TRANSITIONS: &[(Status, Transition, Status)] = &[
    (Status::Pending, Transition::StartValidation, Status::Validating),
    (Status::Validating, Transition::ValidationSucceed, Status::Processing),
    (Status::Validating, Transition::ValidationFail, Status::ValidationFailed),
    (Status::Processing, Transition::Complete, Status::Completed),
    (Status::Pending, Transition::Fail, Status::Failed),
    (Status::Validating, Transition::Fail, Status::Failed),
    (Status::Processing, Transition::Fail, Status::Failed),
];

/// Look up the target of `transition` from `from`, if that edge exists.
pub fn next_status(from: Status, transition: Transition) -> Option<Status> {
    TRANSITIONS
        .iter()
        .find(|(f, t, _)| *f == from && *t == transition)
        .map(|(_, _, to)| *to)
}

/// One entry of a document's audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: Status,
    pub to: Status,
    pub transition: Transition,
    pub at: DateTime<Utc>,
}

// ── Document ─────────────────────────────────────────────────────────────────

/// The persisted unit of work.
///
/// Fields are private: status only moves through [`Document::transition`]
/// and [`Document::complete`], which keeps the generated attachment and the
/// `completed` status in lockstep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DocumentRecord", into = "DocumentRecord")]
pub struct Document {
    id: DocumentId,
    original_filename: String,
    generated_filename: Option<String>,
    status: Status,
    source: AttachmentRef,
    generated: Option<AttachmentRef>,
    issues_found: Vec<String>,
    warnings: Vec<String>,
    history: Vec<StatusChange>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a `pending` document.
    ///
    /// # Errors
    /// Every blank required field is reported, not just the first.
    pub fn create(
        id: DocumentId,
        original_filename: &str,
        source: Option<AttachmentRef>,
    ) -> Result<Self, InputErrors> {
        let mut errors = InputErrors::default();
        let source = match source {
            Some(s) if s.byte_size > 0 => Some(s),
            _ => {
                errors.push(InputError::MissingSource);
                None
            }
        };
        if original_filename.trim().is_empty() {
            errors.push(InputError::MissingFilename);
        }

        match (source, errors.is_empty()) {
            (Some(source), true) => {
                let now = Utc::now();
                Ok(Self {
                    id,
                    original_filename: original_filename.to_string(),
                    generated_filename: None,
                    status: Status::Pending,
                    source,
                    generated: None,
                    issues_found: Vec::new(),
                    warnings: Vec::new(),
                    history: Vec::new(),
                    created_at: now,
                    updated_at: now,
                })
            }
            _ => Err(errors),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    pub fn generated_filename(&self) -> Option<&str> {
        self.generated_filename.as_deref()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn source(&self) -> &AttachmentRef {
        &self.source
    }

    pub fn generated(&self) -> Option<&AttachmentRef> {
        self.generated.as_ref()
    }

    pub fn issues_found(&self) -> &[String] {
        &self.issues_found
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Status changes in the order they happened.
    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Apply a named transition.
    ///
    /// `complete` is rejected here; use [`Document::complete`], which also
    /// attaches the generated file.
    ///
    /// # Errors
    /// [`StateError::InvalidTransition`] when the edge does not exist.
    pub fn transition(&mut self, transition: Transition) -> Result<Status, StateError> {
        let to = self.edge(transition)?;
        if transition == Transition::Complete {
            return Err(StateError::GeneratedFileMismatch { id: self.id });
        }
        Ok(self.apply(transition, to))
    }

    /// Attach the generated file and move `processing → completed` as one step.
    pub fn complete(
        &mut self,
        generated: AttachmentRef,
        generated_filename: String,
    ) -> Result<Status, StateError> {
        let to = self.edge(Transition::Complete)?;
        self.generated = Some(generated);
        self.generated_filename = Some(generated_filename);
        Ok(self.apply(Transition::Complete, to))
    }

    /// Store what the repair oracle reported.
    pub fn record_review(&mut self, issues_found: Vec<String>, warnings: Vec<String>) {
        self.issues_found = issues_found;
        self.warnings = warnings;
        self.updated_at = Utc::now();
    }

    fn edge(&self, transition: Transition) -> Result<Status, StateError> {
        next_status(self.status, transition).ok_or(StateError::InvalidTransition {
            id: self.id,
            from: self.status,
            transition,
        })
    }

    fn apply(&mut self, transition: Transition, to: Status) -> Status {
        let from = self.status;
        info!("Document {} transition {} to {}", self.id, from, to);

        let now = Utc::now();
        self.status = to;
        self.updated_at = now;
        self.history.push(StatusChange {
            from,
            to,
            transition,
            at: now,
        });
        to
    }
}

// ── Persistence shape ────────────────────────────────────────────────────────

/// The raw persisted form. Loading goes through `TryFrom`, so a record with
/// an unknown status or a broken completion invariant is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub original_file_name: String,
    #[serde(default)]
    pub generated_file_name: Option<String>,
    pub status: String,
    pub source: AttachmentRef,
    #[serde(default)]
    pub generated: Option<AttachmentRef>,
    #[serde(default)]
    pub issues_found: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DocumentRecord> for Document {
    type Error = StateError;

    fn try_from(record: DocumentRecord) -> Result<Self, Self::Error> {
        let status: Status = record.status.parse()?;
        if (status == Status::Completed) != record.generated.is_some() {
            return Err(StateError::GeneratedFileMismatch { id: record.id });
        }
        Ok(Self {
            id: record.id,
            original_filename: record.original_file_name,
            generated_filename: record.generated_file_name,
            status,
            source: record.source,
            generated: record.generated,
            issues_found: record.issues_found,
            warnings: record.warnings,
            history: record.history,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

impl From<Document> for DocumentRecord {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            original_file_name: doc.original_filename,
            generated_file_name: doc.generated_filename,
            status: doc.status.as_str().to_string(),
            source: doc.source,
            generated: doc.generated,
            issues_found: doc.issues_found,
            warnings: doc.warnings,
            history: doc.history,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}
