//! Job dispatch: run conversions in the background.
//!
//! A job is just `(document id, use AI repair)`. [`perform`] is the entry
//! point a queue calls for each delivery; it runs the orchestrator on its
//! own task so that a panic anywhere in the pipeline still ends with the
//! document marked `failed` rather than stuck in `processing`.
//!
//! [`Dispatcher`] is the in-process queue: an unbounded channel drained by
//! up to `concurrency` workers at once. Documents share no mutable state,
//! so workers never wait on each other.

use crate::convert::{Converter, RunOptions, RunOutcome};
use crate::document::DocumentId;
use crate::error::{ConversionError, DispatchError};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

/// One unit of queued work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionJob {
    pub document_id: DocumentId,
    pub use_ai_repair: bool,
}

/// Anything that accepts conversion jobs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: ConversionJob) -> Result<(), DispatchError>;
}

/// Run one job to completion.
///
/// Safe to call more than once for the same document: a document that is
/// already terminal is skipped.
pub async fn perform(
    converter: &Arc<Converter>,
    job: ConversionJob,
) -> Result<RunOutcome, ConversionError> {
    let worker = Arc::clone(converter);
    let task = tokio::spawn(async move {
        let mut document = worker.repository().find(job.document_id).await?;
        worker
            .run(
                &mut document,
                RunOptions {
                    use_ai_repair: job.use_ai_repair,
                },
            )
            .await
    });

    match task.await {
        Ok(result) => result,
        Err(join) => {
            let reason = if join.is_panic() {
                "worker panicked"
            } else {
                "worker was cancelled"
            };
            error!("Document {}: {}", job.document_id, reason);
            match converter.repository().find(job.document_id).await {
                Ok(mut document) => converter.mark_failed(&mut document).await,
                Err(e) => error!("Document {}: cannot reload after crash: {}", job.document_id, e),
            }
            Err(ConversionError::WorkerCrashed(reason.to_string()))
        }
    }
}

/// Cheap, cloneable sending side of a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    sender: mpsc::UnboundedSender<ConversionJob>,
}

#[async_trait]
impl JobQueue for DispatcherHandle {
    async fn enqueue(&self, job: ConversionJob) -> Result<(), DispatchError> {
        self.sender
            .send(job)
            .map_err(|e| DispatchError::QueueClosed(e.0.document_id))?;
        debug!("Enqueued document {}", job.document_id);
        Ok(())
    }
}

/// In-process job queue with bounded parallelism.
#[derive(Debug)]
pub struct Dispatcher {
    handle: DispatcherHandle,
    worker: JoinHandle<()>,
}

impl Dispatcher {
    /// Spawn the worker loop. Must be called inside a Tokio runtime.
    pub fn start(converter: Arc<Converter>, concurrency: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<ConversionJob>();
        let concurrency = concurrency.max(1);
        info!("Dispatcher started with {} workers", concurrency);

        let worker = tokio::spawn(async move {
            UnboundedReceiverStream::new(receiver)
                .for_each_concurrent(concurrency, |job| {
                    let converter = Arc::clone(&converter);
                    async move {
                        match perform(&converter, job).await {
                            Ok(outcome) => debug!("Document {}: {:?}", job.document_id, outcome),
                            Err(e) => warn!("Document {}: {}", job.document_id, e),
                        }
                    }
                })
                .await;
        });

        Self {
            handle: DispatcherHandle { sender },
            worker,
        }
    }

    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    /// Stop accepting jobs and wait for queued ones to finish.
    ///
    /// Returns once every other [`DispatcherHandle`] has also been dropped.
    pub async fn shutdown(self) {
        drop(self.handle);
        if let Err(e) = self.worker.await {
            error!("Dispatcher worker loop ended abnormally: {}", e);
        }
        info!("Dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Status};
    use crate::error::EngineError;
    use crate::pipeline::engine::{PrintOptions, RenderEngine};
    use crate::pipeline::render::Renderer;
    use crate::pipeline::template::TemplateBuilder;
    use crate::store::{AttachmentStore, DocumentRepository, MemoryAttachmentStore, MemoryDocumentRepository};

    struct Engine {
        panic: bool,
    }

    #[async_trait]
    impl RenderEngine for Engine {
        fn name(&self) -> &str {
            "test"
        }

        async fn print_to_pdf(&self, _html: &str, _options: &PrintOptions) -> Result<Vec<u8>, EngineError> {
            if self.panic {
                panic!("engine exploded");
            }
            Ok(b"%PDF-1.7".to_vec())
        }
    }

    async fn setup(panic: bool, uploads: usize) -> (Arc<Converter>, Vec<DocumentId>) {
        let store = Arc::new(MemoryAttachmentStore::new());
        let repository = Arc::new(MemoryDocumentRepository::new());
        let mut ids = Vec::new();
        for i in 0..uploads {
            let name = format!("drawing-{i}.svg");
            let source = store
                .attach(b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>".to_vec(), &name, "image/svg+xml")
                .await
                .unwrap();
            let id = repository.next_id().await.unwrap();
            repository
                .insert(Document::create(id, &name, Some(source)).unwrap())
                .await
                .unwrap();
            ids.push(id);
        }
        let renderer = Renderer::new(Arc::new(Engine { panic }), TemplateBuilder::default());
        (Arc::new(Converter::new(store, repository, renderer)), ids)
    }

    fn job(id: DocumentId) -> ConversionJob {
        ConversionJob {
            document_id: id,
            use_ai_repair: false,
        }
    }

    #[tokio::test]
    async fn dispatcher_drains_every_job() {
        let (converter, ids) = setup(false, 5).await;
        let dispatcher = Dispatcher::start(Arc::clone(&converter), 2);
        let handle = dispatcher.handle();
        for id in &ids {
            handle.enqueue(job(*id)).await.unwrap();
        }
        drop(handle);
        dispatcher.shutdown().await;

        for id in ids {
            let doc = converter.repository().find(id).await.unwrap();
            assert_eq!(doc.status(), Status::Completed, "document {id}");
        }
    }

    #[tokio::test]
    async fn redelivery_is_skipped() {
        let (converter, ids) = setup(false, 1).await;
        assert_eq!(perform(&converter, job(ids[0])).await.unwrap(), RunOutcome::Completed);
        assert_eq!(
            perform(&converter, job(ids[0])).await.unwrap(),
            RunOutcome::Skipped(Status::Completed)
        );
    }

    #[tokio::test]
    async fn panicking_worker_marks_document_failed() {
        let (converter, ids) = setup(true, 1).await;
        let err = perform(&converter, job(ids[0])).await.unwrap_err();
        assert!(matches!(err, ConversionError::WorkerCrashed(_)));
        let doc = converter.repository().find(ids[0]).await.unwrap();
        assert_eq!(doc.status(), Status::Failed);
    }

    #[tokio::test]
    async fn unknown_document_is_a_store_error() {
        let (converter, _) = setup(false, 0).await;
        let err = perform(&converter, job(DocumentId(404))).await.unwrap_err();
        assert!(matches!(err, ConversionError::Store(_)));
    }

    #[tokio::test]
    async fn closed_queue_rejects_jobs() {
        let (sender, receiver) = mpsc::unbounded_channel();
        drop(receiver);
        let handle = DispatcherHandle { sender };
        assert_eq!(
            handle.enqueue(job(DocumentId(1))).await.unwrap_err(),
            DispatchError::QueueClosed(DocumentId(1))
        );
    }
}
