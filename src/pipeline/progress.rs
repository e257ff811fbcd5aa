//! Progress event sink shared by the orchestrators and the batch coordinator.
//!
//! External surfaces subscribe through [`ProgressTracker::subscribe`] and
//! receive transient [`ProgressEvent`]s; nothing here is persisted. The
//! aggregate counters are atomics so concurrent documents never lose updates,
//! and they only ever increase.

use super::types::{Phase, ProgressEvent, ProgressScope};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Sink for progress events plus the batch-level rollup counters.
pub struct ProgressTracker {
    sender: broadcast::Sender<ProgressEvent>,
    documents_total: AtomicUsize,
    documents_completed: AtomicUsize,
    chunks_total: AtomicUsize,
    chunks_completed: AtomicUsize,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Create a tracker with no subscribers and zeroed counters.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            documents_total: AtomicUsize::new(0),
            documents_completed: AtomicUsize::new(0),
            chunks_total: AtomicUsize::new(0),
            chunks_completed: AtomicUsize::new(0),
        }
    }

    /// Subscribe to progress events. Slow subscribers may observe gaps.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Current batch-level rollup.
    pub fn batch_progress(&self) -> BatchProgress {
        BatchProgress {
            documents_completed: self.documents_completed.load(Ordering::Relaxed),
            documents_total: self.documents_total.load(Ordering::Relaxed),
            chunks_completed: self.chunks_completed.load(Ordering::Relaxed),
            chunks_total: self.chunks_total.load(Ordering::Relaxed),
        }
    }

    /// Emit a document-scoped phase event.
    pub(crate) fn document_phase(
        &self,
        document: &str,
        phase: Phase,
        completed: usize,
        total: usize,
    ) {
        self.emit(ProgressEvent {
            scope: ProgressScope::Document(document.to_string()),
            phase,
            completed,
            total,
        });
    }

    /// Record the number of documents submitted to the batch.
    pub(crate) fn set_documents_total(&self, total: usize) {
        self.documents_total.store(total, Ordering::Relaxed);
        self.emit(ProgressEvent {
            scope: ProgressScope::Batch,
            phase: Phase::Summarizing,
            completed: 0,
            total,
        });
    }

    /// Add a document's chunk count to the batch rollup once it is known.
    pub(crate) fn add_chunks_total(&self, count: usize) {
        self.chunks_total.fetch_add(count, Ordering::Relaxed);
    }

    /// Record one terminally resolved chunk call and emit the rollup.
    pub(crate) fn chunk_completed(&self) {
        let completed = self.chunks_completed.fetch_add(1, Ordering::Relaxed) + 1;
        self.emit(ProgressEvent {
            scope: ProgressScope::Batch,
            phase: Phase::Summarizing,
            completed,
            total: self.chunks_total.load(Ordering::Relaxed),
        });
    }

    /// Record one finished document (done or failed) and emit the aggregate.
    pub(crate) fn document_completed(&self) {
        let completed = self.documents_completed.fetch_add(1, Ordering::Relaxed) + 1;
        let total = self.documents_total.load(Ordering::Relaxed);
        let phase = if completed >= total {
            Phase::Done
        } else {
            Phase::Summarizing
        };
        self.emit(ProgressEvent {
            scope: ProgressScope::Batch,
            phase,
            completed,
            total,
        });
    }

    fn emit(&self, event: ProgressEvent) {
        // Send only fails when nobody is subscribed, which is fine.
        let _ = self.sender.send(event);
    }
}

/// Monotonic batch-level rollup counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BatchProgress {
    /// Documents that reached `Done` or `Failed`.
    pub documents_completed: usize,
    /// Documents submitted to the batch.
    pub documents_total: usize,
    /// Chunk calls that terminally resolved across all documents.
    pub chunks_completed: usize,
    /// Chunks produced across all documents so far.
    pub chunks_total: usize,
}
