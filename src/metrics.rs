use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_summarized: AtomicU64,
    documents_failed: AtomicU64,
    chunks_summarized: AtomicU64,
    chunks_failed: AtomicU64,
    provider_retries: AtomicU64,
    breaker_trips: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document that produced a usable summary, with its chunk counts.
    pub fn record_document(&self, chunks_ok: u64, chunks_failed: u64) {
        self.documents_summarized.fetch_add(1, Ordering::Relaxed);
        self.chunks_summarized.fetch_add(chunks_ok, Ordering::Relaxed);
        self.chunks_failed.fetch_add(chunks_failed, Ordering::Relaxed);
    }

    /// Record a document that terminated without a usable summary.
    pub fn record_document_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one provider retry (a repeat attempt after a retryable failure).
    pub fn record_retry(&self) {
        self.provider_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a circuit-breaker transition to open.
    pub fn record_breaker_trip(&self) {
        self.breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_summarized: self.documents_summarized.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            chunks_summarized: self.chunks_summarized.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
            provider_retries: self.provider_retries.load(Ordering::Relaxed),
            breaker_trips: self.breaker_trips.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents that finished with a usable summary since startup.
    pub documents_summarized: u64,
    /// Documents that terminated without a usable summary.
    pub documents_failed: u64,
    /// Chunk calls that returned a summary.
    pub chunks_summarized: u64,
    /// Chunk calls that exhausted the gateway.
    pub chunks_failed: u64,
    /// Repeat provider attempts issued after retryable failures.
    pub provider_retries: u64,
    /// Times a circuit breaker opened.
    pub breaker_trips: u64,
}
