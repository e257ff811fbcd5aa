//! Document processing pipeline.
//!
//! Data flows leaf-first: extracted text is split by the chunker, each chunk
//! is summarized through the provider gateway, and the reduction step folds
//! the ordered partial results into one document summary. The orchestrator
//! drives that sequence for a single document; the batch coordinator fans the
//! whole pipeline out across documents under a concurrency bound.

/// Batch coordination across documents.
pub mod batch;
/// Pure text chunking with overlap and boundary preference.
pub mod chunking;
/// Per-document orchestration state machine.
pub mod orchestrator;
/// Progress event sink and batch rollup counters.
pub mod progress;
/// Reduction of ordered chunk results into one summary.
pub mod reduction;
/// Chunk-level summarization calls.
pub mod summarize;
/// Pipeline data model and error taxonomy.
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use batch::{BatchCoordinator, BatchOptions};
pub use chunking::{ChunkConfig, chunk_document, chunk_text, reconstruct_text};
pub use orchestrator::{DocumentOrchestrator, PipelineConfig};
pub use progress::{BatchProgress, ProgressTracker};
pub use summarize::ChunkSummarizer;
pub use types::{
    BatchResult, Chunk, ChunkResult, ChunkStatus, ConfigurationError, Document, DocumentResult,
    DocumentStatus, FailureReason, Phase, ProgressEvent, ProgressScope, Summary,
};
