//! The create/show contract an HTTP layer sits on.
//!
//! `POST /documents` maps to [`DocumentService::create`] (`201` with the
//! view, or `422` with [`crate::error::InputErrors`]); `GET /documents/{id}`
//! maps to [`DocumentService::show`]. Status codes come from
//! [`ServiceError::status_code`].

use crate::document::{Document, DocumentId, Status, Transition};
use crate::error::{InputError, InputErrors, ServiceError};
use crate::jobs::{ConversionJob, JobQueue};
use crate::store::{AttachmentStore, DocumentRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// A client upload.
#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub filename: Option<String>,
    pub bytes: Option<Vec<u8>>,
    pub use_ai_repair: bool,
}

/// The serialised document returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentView {
    pub id: DocumentId,
    pub original_file_name: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pdf_file_url: Option<String>,
    pub issues_found: Vec<String>,
    pub warnings: Vec<String>,
}

impl DocumentView {
    /// Project a document for clients; the PDF URL appears only once completed.
    pub fn from_document(document: &Document, store: &dyn AttachmentStore) -> Self {
        Self {
            id: document.id(),
            original_file_name: document.original_filename().to_string(),
            status: document.status(),
            pdf_file_url: document
                .generated()
                .filter(|_| document.status() == Status::Completed)
                .map(|attachment| store.url(attachment)),
            issues_found: document.issues_found().to_vec(),
            warnings: document.warnings().to_vec(),
        }
    }
}

pub struct DocumentService {
    store: Arc<dyn AttachmentStore>,
    repository: Arc<dyn DocumentRepository>,
    queue: Arc<dyn JobQueue>,
}

impl DocumentService {
    pub fn new(
        store: Arc<dyn AttachmentStore>,
        repository: Arc<dyn DocumentRepository>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            store,
            repository,
            queue,
        }
    }

    /// Accept an upload: validate it, store the source, persist a `pending`
    /// document and enqueue its conversion.
    ///
    /// # Errors
    /// [`ServiceError::Invalid`] lists every missing field.
    pub async fn create(&self, upload: Upload) -> Result<DocumentView, ServiceError> {
        let mut problems = InputErrors::default();
        let bytes = upload.bytes.filter(|b| !b.is_empty());
        if bytes.is_none() {
            problems.push(InputError::MissingSource);
        }
        let filename = upload
            .filename
            .filter(|f| !f.trim().is_empty());
        if filename.is_none() {
            problems.push(InputError::MissingFilename);
        }
        let (Some(bytes), Some(filename)) = (bytes, filename) else {
            return Err(ServiceError::Invalid(problems));
        };

        let source = self.store.attach(bytes, &filename, "image/svg+xml").await?;
        let id = self.repository.next_id().await?;
        let document =
            Document::create(id, &filename, Some(source)).map_err(ServiceError::Invalid)?;
        let view = DocumentView::from_document(&document, self.store.as_ref());
        self.repository.insert(document.clone()).await?;

        let job = ConversionJob {
            document_id: id,
            use_ai_repair: upload.use_ai_repair,
        };
        if let Err(e) = self.queue.enqueue(job).await {
            error!("Document {} could not be queued: {}", id, e);
            self.abandon(document).await;
            return Err(e.into());
        }
        info!("Accepted document {} ({})", id, filename);
        Ok(view)
    }

    /// A document nobody will ever convert must not stay `pending`.
    async fn abandon(&self, mut document: Document) {
        if let Err(e) = document.transition(Transition::Fail) {
            error!("Document {}: {}", document.id(), e);
            return;
        }
        if let Err(e) = self.repository.save(&document).await {
            error!("Document {}: could not persist failure: {}", document.id(), e);
        }
    }

    pub async fn show(&self, id: DocumentId) -> Result<DocumentView, ServiceError> {
        let document = self.repository.find(id).await?;
        Ok(DocumentView::from_document(&document, self.store.as_ref()))
    }
}
