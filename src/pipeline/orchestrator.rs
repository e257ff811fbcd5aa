//! Per-document orchestration.
//!
//! One orchestrator run drives a single document through
//! `Parsing → Chunking → Summarizing → Reducing → Done`, with a terminal
//! `Failed` reachable from every state. Summarizing never fails the document
//! by itself; chunk failures are carried as data into the reduction step,
//! which applies the failed-fraction policy. Cancellation is cooperative: the
//! token is checked between transitions and before each chunk dispatch, and
//! in-flight provider calls are left to finish or time out on their own.

use crate::gateway::ProviderGateway;
use crate::metrics::PipelineMetrics;
use crate::parser::DocumentParser;
use futures_util::future::join_all;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::chunking::{ChunkConfig, chunk_document};
use super::progress::ProgressTracker;
use super::reduction::{Reducer, ReductionOutcome};
use super::summarize::ChunkSummarizer;
use super::types::{
    Chunk, ChunkResult, ChunkStatus, Document, DocumentResult, DocumentStatus, FailureReason,
    Phase,
};

/// Settings governing one document's trip through the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Chunker sizing.
    pub chunk: ChunkConfig,
    /// Maximum concurrent chunk calls within this document.
    pub chunk_fan_out: usize,
    /// Failed-chunk fraction at which the document is considered failed.
    pub failed_chunk_threshold: f64,
    /// Word budget requested from the provider for summaries.
    pub summary_max_words: usize,
    /// Model identifier passed to the provider.
    pub model: String,
}

/// Runs one document through the summarization pipeline.
pub struct DocumentOrchestrator {
    gateway: Arc<ProviderGateway>,
    config: PipelineConfig,
    progress: Arc<ProgressTracker>,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
}

impl DocumentOrchestrator {
    /// Build an orchestrator over the given gateway and settings.
    pub fn new(
        gateway: Arc<ProviderGateway>,
        config: PipelineConfig,
        progress: Arc<ProgressTracker>,
        metrics: Arc<PipelineMetrics>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            config,
            progress,
            metrics,
            cancel,
        }
    }

    /// Extract the document at `path` and run it through the pipeline.
    ///
    /// Parser failures terminate this document only; they are returned as a
    /// `Failed` result, never raised.
    pub async fn run_path(&self, parser: &dyn DocumentParser, path: &Path) -> DocumentResult {
        let started_at = now_rfc3339();
        let clock = Instant::now();
        let origin = path.display().to_string();

        self.progress.document_phase(&origin, Phase::Parsing, 0, 1);
        if self.cancel.is_cancelled() {
            return self.failed(
                String::new(),
                origin,
                Vec::new(),
                FailureReason::Cancelled,
                started_at,
                clock,
            );
        }

        match parser.extract(path).await {
            Ok(document) => self.run_parsed(document, started_at, clock).await,
            Err(error) => {
                tracing::warn!(origin = %origin, error = %error, "Document parsing failed");
                self.failed(
                    String::new(),
                    origin,
                    Vec::new(),
                    FailureReason::Parsing(error.to_string()),
                    started_at,
                    clock,
                )
            }
        }
    }

    /// Run an already-parsed document through the pipeline.
    pub async fn run(&self, document: Document) -> DocumentResult {
        self.run_parsed(document, now_rfc3339(), Instant::now())
            .await
    }

    async fn run_parsed(
        &self,
        document: Document,
        started_at: String,
        clock: Instant,
    ) -> DocumentResult {
        let id = document.id.clone();
        let origin = document.origin.clone();

        if self.cancel.is_cancelled() {
            return self.failed(
                id,
                origin,
                Vec::new(),
                FailureReason::Cancelled,
                started_at,
                clock,
            );
        }

        self.progress.document_phase(&id, Phase::Chunking, 0, 1);
        let chunks = match chunk_document(&document, &self.config.chunk) {
            Ok(chunks) => chunks,
            Err(error) => {
                return self.failed(
                    id,
                    origin,
                    Vec::new(),
                    FailureReason::InvalidChunking(error.to_string()),
                    started_at,
                    clock,
                );
            }
        };
        if chunks.is_empty() {
            return self.failed(
                id,
                origin,
                Vec::new(),
                FailureReason::EmptyInput,
                started_at,
                clock,
            );
        }

        let total = chunks.len();
        tracing::debug!(document = %id, chunks = total, "Document chunked");
        self.progress.add_chunks_total(total);
        self.progress.document_phase(&id, Phase::Summarizing, 0, total);

        let results = self.summarize_chunks(&chunks).await;

        if self.cancel.is_cancelled() {
            return self.failed(
                id,
                origin,
                results,
                FailureReason::Cancelled,
                started_at,
                clock,
            );
        }

        self.progress.document_phase(&id, Phase::Reducing, total, total);
        let reducer = Reducer::new(
            self.gateway.clone(),
            &self.config.model,
            self.config.summary_max_words,
            self.config.failed_chunk_threshold,
        );

        match reducer.reduce(&results).await {
            ReductionOutcome::Completed {
                summary,
                degraded,
                warnings,
            } => {
                let chunks_ok = results
                    .iter()
                    .filter(|result| result.status == ChunkStatus::Ok)
                    .count() as u64;
                let chunks_failed = results
                    .iter()
                    .filter(|result| result.status == ChunkStatus::Failed)
                    .count() as u64;
                self.metrics.record_document(chunks_ok, chunks_failed);

                let status = if degraded {
                    DocumentStatus::Degraded
                } else {
                    DocumentStatus::Ok
                };
                self.progress.document_phase(&id, Phase::Done, total, total);
                tracing::info!(
                    document = %id,
                    chunks = total,
                    degraded,
                    elapsed_ms = clock.elapsed().as_millis() as u64,
                    "Document summarized"
                );

                DocumentResult {
                    document_id: id,
                    origin,
                    status,
                    degraded,
                    summary: Some(summary),
                    chunks: results,
                    warnings,
                    failure: None,
                    started_at,
                    elapsed_ms: clock.elapsed().as_millis() as u64,
                }
            }
            ReductionOutcome::ThresholdExceeded { failed, total } => self.failed(
                id,
                origin,
                results,
                FailureReason::ChunksFailed { failed, total },
                started_at,
                clock,
            ),
        }
    }

    /// Fan chunk calls out under the per-document bound, joining in ordinal
    /// order regardless of completion order.
    async fn summarize_chunks(&self, chunks: &[Chunk]) -> Vec<ChunkResult> {
        let summarizer = ChunkSummarizer::new(
            self.gateway.clone(),
            &self.config.model,
            self.config.summary_max_words,
        );
        let semaphore = Arc::new(Semaphore::new(self.config.chunk_fan_out.max(1)));
        // Best-effort running context: the latest finished chunk summary,
        // read without blocking on any particular predecessor.
        let latest_summary: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let calls = chunks.iter().map(|chunk| {
            let summarizer = &summarizer;
            let semaphore = semaphore.clone();
            let latest_summary = latest_summary.clone();
            let cancel = self.cancel.clone();
            let progress = self.progress.clone();

            async move {
                let _permit = semaphore.acquire().await.expect("chunk semaphore closed");
                if cancel.is_cancelled() {
                    return ChunkResult::skipped(chunk.index);
                }

                let hint = if chunk.index == 0 {
                    None
                } else {
                    latest_summary.lock().expect("hint lock poisoned").clone()
                };
                let result = summarizer.summarize_chunk(chunk, hint).await;
                if result.status == ChunkStatus::Ok && !result.summary.is_empty() {
                    *latest_summary.lock().expect("hint lock poisoned") =
                        Some(result.summary.clone());
                }
                progress.chunk_completed();
                result
            }
        });

        join_all(calls).await
    }

    fn failed(
        &self,
        document_id: String,
        origin: String,
        chunks: Vec<ChunkResult>,
        reason: FailureReason,
        started_at: String,
        clock: Instant,
    ) -> DocumentResult {
        self.metrics.record_document_failed();
        let subject = if document_id.is_empty() {
            &origin
        } else {
            &document_id
        };
        self.progress.document_phase(subject, Phase::Failed, 0, 0);
        tracing::warn!(document = %subject, reason = %reason, "Document failed");

        DocumentResult {
            document_id,
            origin,
            status: DocumentStatus::Failed,
            degraded: false,
            summary: None,
            chunks,
            warnings: Vec::new(),
            failure: Some(reason),
            started_at,
            elapsed_ms: clock.elapsed().as_millis() as u64,
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
