//! Chunk-level summarization calls and prompt/response helpers.
//!
//! Failures are data at this boundary: a gateway error becomes a
//! `ChunkResult` with status `Failed` so the orchestrator can apply its
//! partial-failure policy instead of unwinding.

use crate::gateway::ProviderGateway;
use crate::provider::CallParams;
use std::sync::Arc;

use super::types::{Chunk, ChunkResult};

/// Summarizes individual chunks through a [`ProviderGateway`].
pub struct ChunkSummarizer {
    gateway: Arc<ProviderGateway>,
    params: CallParams,
    max_words: usize,
}

impl ChunkSummarizer {
    /// Build a summarizer issuing calls for the given model.
    pub fn new(gateway: Arc<ProviderGateway>, model: &str, max_words: usize) -> Self {
        Self {
            gateway,
            params: CallParams::for_model(model),
            max_words,
        }
    }

    /// Summarize one chunk, capturing any gateway failure as result data.
    ///
    /// `context_hint` carries the previous chunk's summary when it happens to
    /// be available; it is best-effort and never blocks.
    pub async fn summarize_chunk(
        &self,
        chunk: &Chunk,
        context_hint: Option<String>,
    ) -> ChunkResult {
        let prompt = build_chunk_prompt(chunk, context_hint.as_deref(), self.max_words);
        match self.gateway.summarize(&prompt, &self.params).await {
            Ok(text) => {
                let (summary, key_points) = parse_chunk_response(&text);
                tracing::debug!(
                    document = %chunk.document_id,
                    chunk = chunk.index,
                    key_points = key_points.len(),
                    "Chunk summarized"
                );
                ChunkResult::ok(chunk.index, summary, key_points)
            }
            Err(error) => {
                tracing::warn!(
                    document = %chunk.document_id,
                    chunk = chunk.index,
                    error = %error,
                    "Chunk summarization failed"
                );
                ChunkResult::failed(chunk.index, &error)
            }
        }
    }
}

/// Build the provider prompt for one chunk.
pub(crate) fn build_chunk_prompt(chunk: &Chunk, hint: Option<&str>, max_words: usize) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "System: You condense document excerpts into concise, factual summaries. Prefer neutral tone. Avoid speculation. Write a single paragraph of at most {max_words} words, then a 'Key points:' list of short bullets.\n\n"
    ));
    if let Some(hint) = hint {
        prompt.push_str(&format!("Context from the preceding excerpt: {hint}\n\n"));
    }
    prompt.push_str("Summarize the following excerpt:\n\n");
    prompt.push_str(&chunk.text);
    prompt
}

/// Split a provider response into the summary paragraph and its key points.
///
/// Lines before a `Key points:` marker form the summary; bullet lines after it
/// become key points. Responses without the marker are all summary.
pub(crate) fn parse_chunk_response(text: &str) -> (String, Vec<String>) {
    let mut summary_lines = Vec::new();
    let mut key_points = Vec::new();
    let mut in_points = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("key points:") {
            in_points = true;
            continue;
        }
        if in_points {
            if let Some(point) = bullet_text(trimmed) {
                key_points.push(point.to_string());
            }
        } else if !trimmed.is_empty() {
            summary_lines.push(trimmed);
        }
    }

    (summary_lines.join(" "), key_points)
}

/// Strip a bullet marker, returning the point text.
pub(crate) fn bullet_text(line: &str) -> Option<&str> {
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .map(str::trim)
        .filter(|point| !point.is_empty())
}
