//! Chunk-boundary heuristics and the offset-accurate splitter.
//!
//! This module decides where a document's text is cut. Highlights:
//!
//! - Sizing is measured in characters; `start`/`end` offsets always land on
//!   `char` boundaries so any chunk can be sliced back out of the original.
//! - Overlap is taken from the tail of the previous chunk, keeping the
//!   ordinal-to-offset mapping monotonic.
//! - Within a tolerance window before the size budget the splitter prefers a
//!   paragraph break, then a sentence break; otherwise it cuts at the exact
//!   budget.
//! - Concatenating chunk texts while dropping each non-first chunk's first
//!   `overlap` characters reconstructs the input exactly.

use super::types::{Chunk, ConfigurationError, Document};

/// Sizing settings for the chunker.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Hard upper bound on chunk length, in characters.
    pub max_chunk_size: usize,
    /// Characters carried over from the previous chunk's tail.
    pub overlap_size: usize,
    /// Window before the budget in which boundary breaks are preferred.
    pub boundary_tolerance: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 4000,
            overlap_size: 200,
            boundary_tolerance: 200,
        }
    }
}

impl ChunkConfig {
    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_chunk_size == 0 {
            return Err(ConfigurationError::ZeroChunkSize);
        }
        if self.overlap_size >= self.max_chunk_size {
            return Err(ConfigurationError::OverlapTooLarge {
                overlap: self.overlap_size,
                max: self.max_chunk_size,
            });
        }
        Ok(())
    }

    /// Tolerance clamped so every split still advances past the overlap.
    fn effective_tolerance(&self) -> usize {
        self.boundary_tolerance
            .min(self.max_chunk_size - self.overlap_size - 1)
    }
}

/// Split a document's text into ordered, overlapping chunks.
pub fn chunk_document(document: &Document, config: &ChunkConfig) -> Result<Vec<Chunk>, ConfigurationError> {
    chunk_text(&document.id, &document.text, config)
}

/// Split raw text into ordered, overlapping chunks for the given document id.
///
/// Returns an empty vector for empty input; callers treat that as a failed
/// precondition rather than an error here.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    config: &ChunkConfig,
) -> Result<Vec<Chunk>, ConfigurationError> {
    config.validate()?;

    // Byte offset of every char, plus the terminal length, so char-space
    // arithmetic can slice the original text directly.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    if total_chars == 0 {
        return Ok(Vec::new());
    }

    let tolerance = config.effective_tolerance();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let index = chunks.len();
        let end = if total_chars - start <= config.max_chunk_size {
            total_chars
        } else {
            let budget_end = start + config.max_chunk_size;
            preferred_break(text, &boundaries, budget_end, tolerance).unwrap_or(budget_end)
        };

        let overlap = if index == 0 { 0 } else { config.overlap_size };
        chunks.push(Chunk {
            document_id: document_id.to_string(),
            index,
            start,
            end,
            overlap,
            text: text[boundaries[start]..boundaries[end]].to_string(),
        });

        if end == total_chars {
            break;
        }
        start = end - config.overlap_size;
    }

    Ok(chunks)
}

/// Find the latest preferred break at or before `budget_end` (char offset).
///
/// Scans the `tolerance`-sized window ending at the budget for a paragraph
/// break first, then a sentence break. Returns the char offset to cut at, or
/// `None` when the window holds no acceptable boundary.
fn preferred_break(
    text: &str,
    boundaries: &[usize],
    budget_end: usize,
    tolerance: usize,
) -> Option<usize> {
    if tolerance == 0 {
        return None;
    }
    let window_start = budget_end.saturating_sub(tolerance);
    let window = &text[boundaries[window_start]..boundaries[budget_end]];

    if let Some(byte_pos) = window.rfind("\n\n") {
        let chars_before = window[..byte_pos].chars().count();
        return Some(window_start + chars_before + 2);
    }

    let mut cut = None;
    let mut previous: Option<(usize, char)> = None;
    for (char_pos, current) in window.chars().enumerate() {
        if let Some((punct_pos, punct)) = previous {
            if matches!(punct, '.' | '!' | '?') && current.is_whitespace() {
                cut = Some(window_start + punct_pos + 2);
            }
        }
        previous = Some((char_pos, current));
    }
    cut
}

/// Reassemble the original text from a chunk sequence by trimming overlaps.
pub fn reconstruct_text(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    for chunk in chunks {
        let mut chars = chunk.text.chars();
        for _ in 0..chunk.overlap {
            chars.next();
        }
        text.push_str(chars.as_str());
    }
    text
}
