//! Core data types and error definitions for the summarization pipeline.

use crate::gateway::GatewayError;
use crate::parser::{DocumentFormat, approx_token_count};
use crate::provider::ProviderErrorKind;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A parsed document ready for chunking.
///
/// Immutable once constructed; owned by exactly one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// Stable identifier derived from the document content.
    pub id: String,
    /// Source path or logical name.
    pub origin: String,
    /// Extracted text.
    pub text: String,
    /// Source format tag.
    pub format: DocumentFormat,
    /// Text length in characters.
    pub chars: usize,
    /// Estimated token count.
    pub approx_tokens: usize,
}

impl Document {
    /// Build a document from extracted text, deriving its identifier and sizes.
    pub fn new(origin: impl Into<String>, text: String, format: DocumentFormat) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self {
            id: format!("doc-{}", &digest[..16]),
            origin: origin.into(),
            chars: text.chars().count(),
            approx_tokens: approx_token_count(&text),
            text,
            format,
        }
    }
}

/// A bounded slice of a document's text with defined overlap to its predecessor.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Identifier of the parent document.
    pub document_id: String,
    /// 0-based ordinal; contiguous within a document.
    pub index: usize,
    /// Start offset into the original text, in characters.
    pub start: usize,
    /// End offset (exclusive) into the original text, in characters.
    pub end: usize,
    /// Characters at the head of this chunk shared with the previous chunk's tail.
    pub overlap: usize,
    /// Text payload.
    pub text: String,
}

/// Terminal status of one chunk's summarization call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    /// The provider returned a summary.
    Ok,
    /// The gateway was exhausted or rejected the call.
    Failed,
    /// The chunk was never dispatched (cancellation).
    Skipped,
}

/// Failure detail captured on a failed chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkError {
    /// Provider failure kind, when the gateway reached the provider.
    pub kind: Option<ProviderErrorKind>,
    /// Human-readable description.
    pub message: String,
}

/// Outcome of summarizing one chunk; ordinal is the join key for reduction.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkResult {
    /// Ordinal of the chunk this result belongs to.
    pub index: usize,
    /// Partial summary text (empty when failed or skipped).
    pub summary: String,
    /// Key points extracted from the chunk.
    pub key_points: Vec<String>,
    /// Terminal status of the call.
    pub status: ChunkStatus,
    /// Failure detail when `status` is `Failed`.
    pub error: Option<ChunkError>,
}

impl ChunkResult {
    /// A successful result carrying the partial summary and key points.
    pub fn ok(index: usize, summary: String, key_points: Vec<String>) -> Self {
        Self {
            index,
            summary,
            key_points,
            status: ChunkStatus::Ok,
            error: None,
        }
    }

    /// A failed result recording the gateway error as data.
    pub fn failed(index: usize, error: &GatewayError) -> Self {
        Self {
            index,
            summary: String::new(),
            key_points: Vec::new(),
            status: ChunkStatus::Failed,
            error: Some(ChunkError {
                kind: error.provider_kind(),
                message: error.to_string(),
            }),
        }
    }

    /// A result for a chunk that was never dispatched.
    pub fn skipped(index: usize) -> Self {
        Self {
            index,
            summary: String::new(),
            key_points: Vec::new(),
            status: ChunkStatus::Skipped,
            error: None,
        }
    }
}

/// Structured summary assembled by the reduction step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Document-level overview.
    pub overview: String,
    /// De-duplicated key points in ordinal order.
    pub key_points: Vec<String>,
    /// Action items, when the provider surfaced any.
    pub action_items: Option<Vec<String>>,
}

/// Overall status of a processed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Every chunk summarized and the reduction pass completed.
    Ok,
    /// A usable summary exists but some sub-step failed.
    Degraded,
    /// No usable summary could be produced.
    Failed,
}

/// Why a document terminated without a usable summary.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum FailureReason {
    /// Text extraction failed.
    #[error("parsing failed: {0}")]
    Parsing(String),
    /// The extracted text was empty.
    #[error("document contained no text to chunk")]
    EmptyInput,
    /// Chunking configuration was invalid.
    #[error("chunking configuration invalid: {0}")]
    InvalidChunking(String),
    /// The failed-chunk fraction met the configured threshold.
    #[error("{failed} of {total} chunks failed")]
    ChunksFailed {
        /// Chunks whose calls failed.
        failed: usize,
        /// Total chunk count.
        total: usize,
    },
    /// Processing was cancelled before completion.
    #[error("processing was cancelled")]
    Cancelled,
}

/// Terminal result for one document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResult {
    /// Identifier of the processed document (empty when parsing failed).
    pub document_id: String,
    /// Source path or logical name.
    pub origin: String,
    /// Overall status.
    pub status: DocumentStatus,
    /// Set when a sub-step failed but a best-effort summary is still present.
    pub degraded: bool,
    /// Final merged summary, absent on failure.
    pub summary: Option<Summary>,
    /// Per-chunk results in ordinal order.
    pub chunks: Vec<ChunkResult>,
    /// Non-fatal findings (failed ordinals, reduction fallback).
    pub warnings: Vec<String>,
    /// Populated when `status` is `Failed`.
    pub failure: Option<FailureReason>,
    /// RFC3339 timestamp of when processing began.
    pub started_at: String,
    /// Wall-clock processing time in milliseconds.
    pub elapsed_ms: u64,
}

/// Aggregate result of a batch run, in submission order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    /// Identifier of this batch run.
    pub batch_id: String,
    /// Per-document results in submission order.
    pub documents: Vec<DocumentResult>,
    /// Documents that finished `Ok`.
    pub succeeded: usize,
    /// Documents that finished `Degraded`.
    pub degraded: usize,
    /// Documents that finished `Failed`.
    pub failed: usize,
    /// Wall-clock batch time in milliseconds.
    pub elapsed_ms: u64,
}

/// Pipeline phase reported through progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Extracting text from the source.
    Parsing,
    /// Splitting text into chunks.
    Chunking,
    /// Dispatching chunk calls to the provider.
    Summarizing,
    /// Merging partial results.
    Reducing,
    /// Terminal success.
    Done,
    /// Terminal failure.
    Failed,
}

/// What a progress event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "scope", content = "id")]
pub enum ProgressScope {
    /// The batch as a whole.
    Batch,
    /// A single document, by identifier or origin.
    Document(String),
}

/// Transient progress notification; not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    /// Subject of the event.
    pub scope: ProgressScope,
    /// Phase the subject is in.
    pub phase: Phase,
    /// Completed unit count (chunks for documents, documents for the batch).
    pub completed: usize,
    /// Total unit count.
    pub total: usize,
}

/// Errors produced by invalid chunker settings.
///
/// Never retried; surfaced immediately to the caller.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// `max_chunk_size` must be positive.
    #[error("max_chunk_size must be greater than zero")]
    ZeroChunkSize,
    /// `overlap_size` must leave room for fresh content in every chunk.
    #[error("overlap_size ({overlap}) must be smaller than max_chunk_size ({max})")]
    OverlapTooLarge {
        /// Configured overlap.
        overlap: usize,
        /// Configured chunk budget.
        max: usize,
    },
}

/// Error from the second-pass reduction call.
#[derive(Debug, Error)]
#[error("reduction pass failed: {0}")]
pub struct ReductionError(#[from] pub GatewayError);
