//! Observer trait for per-document conversion events.
//!
//! Attach an [`Arc<dyn ConversionObserver>`] to a
//! [`crate::convert::Converter`] with `with_observer` to watch documents move
//! through the pipeline. The CLI drives its spinner this way; a server could
//! forward the same events to a websocket or a metrics counter.
//!
//! # Example
//!
//! ```rust
//! use edgequake_svg2pdf::{ConversionObserver, DocumentId, Status};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingObserver {
//!     transitions: AtomicUsize,
//! }
//!
//! impl ConversionObserver for CountingObserver {
//!     fn on_transition(&self, id: DocumentId, from: Status, to: Status) {
//!         self.transitions.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("document {id}: {from} → {to}");
//!     }
//! }
//! ```

use crate::document::{DocumentId, Status};
use std::sync::Arc;

/// Receives events from the orchestrator.
///
/// Several documents can convert at once, so methods may be called
/// concurrently from different tasks. Every method defaults to a no-op.
pub trait ConversionObserver: Send + Sync {
    /// A lifecycle transition was applied and persisted.
    fn on_transition(&self, id: DocumentId, from: Status, to: Status) {
        let _ = (id, from, to);
    }

    /// Validation succeeded.
    ///
    /// # Arguments
    /// * `repaired` — the AI path rewrote the content
    fn on_validated(&self, id: DocumentId, repaired: bool) {
        let _ = (id, repaired);
    }

    /// The engine returned a PDF of `pdf_len` bytes.
    fn on_rendered(&self, id: DocumentId, pdf_len: usize) {
        let _ = (id, pdf_len);
    }

    /// The run ended. `error` is `None` on success.
    fn on_finished(&self, id: DocumentId, status: Status, error: Option<&str>) {
        let _ = (id, status, error);
    }
}

/// The observer used when none is configured.
pub struct NoopObserver;

impl ConversionObserver for NoopObserver {}

pub type ProgressObserver = Arc<dyn ConversionObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ConversionObserver for Recorder {
        fn on_transition(&self, id: DocumentId, from: Status, to: Status) {
            self.events.lock().unwrap().push(format!("{id}:{from}->{to}"));
        }

        fn on_finished(&self, id: DocumentId, status: Status, error: Option<&str>) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{id}:done:{status}:{}", error.unwrap_or("-")));
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_transition(DocumentId(1), Status::Pending, Status::Validating);
        o.on_validated(DocumentId(1), false);
        o.on_rendered(DocumentId(1), 10);
        o.on_finished(DocumentId(1), Status::Completed, None);
    }

    #[test]
    fn overridden_methods_receive_events_and_others_default() {
        let rec = Recorder::default();
        rec.on_transition(DocumentId(3), Status::Validating, Status::Processing);
        rec.on_rendered(DocumentId(3), 2048);
        rec.on_finished(DocumentId(3), Status::Failed, Some("boom"));
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec!["3:validating->processing", "3:done:failed:boom"]
        );
    }

    #[test]
    fn arc_dyn_observer_works() {
        let o: ProgressObserver = Arc::new(NoopObserver);
        o.on_validated(DocumentId(2), true);
    }
}
