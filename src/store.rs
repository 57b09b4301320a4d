//! Attachment storage and document persistence.
//!
//! The pipeline only ever talks to the two traits here. Two attachment
//! stores ship with the crate: [`MemoryAttachmentStore`] for tests and
//! one-shot runs, and [`FsAttachmentStore`] which keeps blobs under a
//! directory on disk. [`MemoryDocumentRepository`] hands out sequential ids.

use crate::document::{Document, DocumentId};
use crate::error::StoreError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Opaque reference to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub key: String,
    pub filename: String,
    pub content_type: String,
    pub byte_size: u64,
}

/// Key/value blob storage.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn attach(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<AttachmentRef, StoreError>;

    async fn read(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, StoreError>;

    /// Where a client can fetch the blob.
    fn url(&self, attachment: &AttachmentRef) -> String;
}

/// Persistence for [`Document`] records.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Reserve the id for the next document.
    async fn next_id(&self) -> Result<DocumentId, StoreError>;

    async fn insert(&self, document: Document) -> Result<(), StoreError>;

    async fn find(&self, id: DocumentId) -> Result<Document, StoreError>;

    /// Overwrite the stored copy of an existing document.
    async fn save(&self, document: &Document) -> Result<(), StoreError>;
}

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Build a unique, path-safe key from a sequence number and a filename.
fn storage_key(seq: u64, filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let cleaned = UNSAFE_CHARS.replace_all(name, "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        format!("{seq:08}-blob")
    } else {
        format!("{seq:08}-{cleaned}")
    }
}

/// Largest sequence number already used by a key under `root`, so new keys
/// continue after it even when earlier files were deleted.
async fn highest_key_prefix(root: &Path) -> Result<u64, StoreError> {
    let io = |source| StoreError::Io {
        path: root.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(root).await.map_err(io)?;
    let mut highest = 0;
    while let Some(entry) = entries.next_entry().await.map_err(io)? {
        let name = entry.file_name();
        let seq = name
            .to_str()
            .and_then(|n| n.split_once('-'))
            .and_then(|(prefix, _)| prefix.parse::<u64>().ok());
        if let Some(seq) = seq {
            highest = highest.max(seq);
        }
    }
    Ok(highest)
}

fn reference(key: String, filename: &str, content_type: &str, len: usize) -> AttachmentRef {
    AttachmentRef {
        key,
        filename: filename.to_string(),
        content_type: content_type.to_string(),
        byte_size: len as u64,
    }
}

// ── In-memory store ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryAttachmentStore {
    seq: AtomicU64,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttachmentStore for MemoryAttachmentStore {
    async fn attach(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<AttachmentRef, StoreError> {
        let key = storage_key(self.seq.fetch_add(1, Ordering::Relaxed) + 1, filename);
        let attachment = reference(key.clone(), filename, content_type, bytes.len());
        self.blobs
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(key, bytes);
        Ok(attachment)
    }

    async fn read(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .get(&attachment.key)
            .cloned()
            .ok_or_else(|| StoreError::AttachmentNotFound {
                key: attachment.key.clone(),
            })
    }

    fn url(&self, attachment: &AttachmentRef) -> String {
        format!("memory://{}", attachment.key)
    }
}

// ── Filesystem store ─────────────────────────────────────────────────────────

/// Stores each blob as a file under `root`.
///
/// URLs are `file://` paths unless a public `base_url` is configured, in
/// which case they are `<base_url>/<key>`.
#[derive(Debug)]
pub struct FsAttachmentStore {
    root: PathBuf,
    base_url: Option<String>,
    seq: AtomicU64,
}

impl FsAttachmentStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| StoreError::Io {
                path: root.clone(),
                source,
            })?;
        let highest = highest_key_prefix(&root).await?;
        Ok(Self {
            root,
            base_url: None,
            seq: AtomicU64::new(highest),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a stored blob.
    pub fn path_of(&self, attachment: &AttachmentRef) -> PathBuf {
        self.root.join(&attachment.key)
    }
}

#[async_trait]
impl AttachmentStore for FsAttachmentStore {
    async fn attach(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> Result<AttachmentRef, StoreError> {
        let key = storage_key(self.seq.fetch_add(1, Ordering::Relaxed) + 1, filename);
        let path = self.root.join(&key);
        let len = bytes.len();
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        debug!("Stored {} bytes at {}", len, path.display());
        Ok(reference(key, filename, content_type, len))
    }

    async fn read(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, StoreError> {
        let path = self.path_of(attachment);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::AttachmentNotFound {
                    key: attachment.key.clone(),
                })
            }
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn url(&self, attachment: &AttachmentRef) -> String {
        match &self.base_url {
            Some(base) => format!("{base}/{}", attachment.key),
            None => format!("file://{}", self.path_of(attachment).display()),
        }
    }
}

// ── In-memory repository ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryDocumentRepository {
    seq: AtomicU64,
    documents: Mutex<HashMap<DocumentId, Document>>,
}

impl MemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentRepository for MemoryDocumentRepository {
    async fn next_id(&self) -> Result<DocumentId, StoreError> {
        Ok(DocumentId(self.seq.fetch_add(1, Ordering::Relaxed) + 1))
    }

    async fn insert(&self, document: Document) -> Result<(), StoreError> {
        self.documents
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(document.id(), document);
        Ok(())
    }

    async fn find(&self, id: DocumentId) -> Result<Document, StoreError> {
        self.documents
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .get(&id)
            .cloned()
            .ok_or(StoreError::DocumentNotFound(id))
    }

    async fn save(&self, document: &Document) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().map_err(|_| StoreError::Poisoned)?;
        match documents.get_mut(&document.id()) {
            Some(stored) => {
                *stored = document.clone();
                Ok(())
            }
            None => Err(StoreError::DocumentNotFound(document.id())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_strips_directories_and_odd_characters() {
        assert_eq!(storage_key(1, "../etc/passwd"), "00000001-passwd");
        assert_eq!(storage_key(2, "my file (1).svg"), "00000002-my_file_1_.svg");
        assert_eq!(storage_key(3, "..."), "00000003-blob");
    }

    #[tokio::test]
    async fn memory_store_round_trips_bytes() {
        let store = MemoryAttachmentStore::new();
        let r = store
            .attach(b"<svg/>".to_vec(), "a.svg", "image/svg+xml")
            .await
            .unwrap();
        assert_eq!(r.byte_size, 6);
        assert_eq!(store.read(&r).await.unwrap(), b"<svg/>");
        assert!(store.url(&r).starts_with("memory://"));
    }

    #[tokio::test]
    async fn memory_store_keys_are_unique() {
        let store = MemoryAttachmentStore::new();
        let a = store.attach(vec![1], "x.svg", "image/svg+xml").await.unwrap();
        let b = store.attach(vec![2], "x.svg", "image/svg+xml").await.unwrap();
        assert_ne!(a.key, b.key);
        assert_eq!(store.read(&a).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn fs_store_writes_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAttachmentStore::open(dir.path().join("blobs")).await.unwrap();
        let r = store
            .attach(b"%PDF-1.7".to_vec(), "out.pdf", "application/pdf")
            .await
            .unwrap();
        assert!(store.path_of(&r).is_file());
        assert_eq!(store.read(&r).await.unwrap(), b"%PDF-1.7");
        assert!(store.url(&r).starts_with("file://"));

        let public = store.with_base_url("https://cdn.example.com/files/");
        assert_eq!(
            public.url(&r),
            format!("https://cdn.example.com/files/{}", r.key)
        );
    }

    #[tokio::test]
    async fn reopened_fs_store_never_reuses_a_key_after_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let first = FsAttachmentStore::open(dir.path()).await.unwrap();
        let a = first.attach(b"a".to_vec(), "a.svg", "image/svg+xml").await.unwrap();
        let b = first.attach(b"b".to_vec(), "b.svg", "image/svg+xml").await.unwrap();
        let c = first.attach(b"c".to_vec(), "c.svg", "image/svg+xml").await.unwrap();
        assert_eq!(c.key, "00000003-c.svg");
        std::fs::remove_file(first.path_of(&a)).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"unrelated").unwrap();

        let reopened = FsAttachmentStore::open(dir.path()).await.unwrap();
        let d = reopened.attach(b"d".to_vec(), "c.svg", "image/svg+xml").await.unwrap();
        assert_eq!(d.key, "00000004-c.svg");
        assert_eq!(reopened.read(&b).await.unwrap(), b"b");
        assert_eq!(reopened.read(&c).await.unwrap(), b"c");
    }

    #[tokio::test]
    async fn fs_store_missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAttachmentStore::open(dir.path()).await.unwrap();
        let ghost = reference("00000009-ghost.svg".into(), "ghost.svg", "image/svg+xml", 3);
        assert!(matches!(
            store.read(&ghost).await,
            Err(StoreError::AttachmentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn repository_assigns_ids_and_saves_existing_only() {
        let repo = MemoryDocumentRepository::new();
        let id = repo.next_id().await.unwrap();
        assert_eq!(id, DocumentId(1));

        let source = reference("k".into(), "a.svg", "image/svg+xml", 6);
        let doc = Document::create(id, "a.svg", Some(source)).unwrap();
        assert!(matches!(
            repo.save(&doc).await,
            Err(StoreError::DocumentNotFound(_))
        ));

        repo.insert(doc.clone()).await.unwrap();
        repo.save(&doc).await.unwrap();
        assert_eq!(repo.find(id).await.unwrap(), doc);
        assert!(matches!(
            repo.find(DocumentId(99)).await,
            Err(StoreError::DocumentNotFound(DocumentId(99)))
        ));
    }
}
