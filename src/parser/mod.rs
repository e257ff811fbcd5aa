//! Document parsing capability consumed by the pipeline.
//!
//! Format-specific byte extraction is an external concern; the pipeline only
//! requires something that satisfies [`DocumentParser`]. A bundled
//! [`TextFileParser`] covers plain-text and Markdown sources so the binary and
//! the tests have a real implementation, while PDF and DOCX extraction is left
//! to out-of-tree parsers.

use crate::pipeline::Document;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tiktoken_rs::{CoreBPE, cl100k_base};

/// Errors raised while extracting text from a source file.
#[derive(Debug, Error)]
pub enum ParsingError {
    /// The file could not be read from disk.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file's format is not handled by this parser.
    #[error("unsupported document format for {0}")]
    UnsupportedFormat(PathBuf),
    /// The file was readable but contained no extractable text.
    #[error("document {0} contained no extractable text")]
    EmptyDocument(PathBuf),
}

/// Format tag attached to a parsed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Portable Document Format.
    Pdf,
    /// Office Open XML word-processing document.
    Docx,
    /// Plain text.
    Text,
    /// Markdown.
    Markdown,
}

impl DocumentFormat {
    /// Infer the format from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" | "text" | "log" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }
}

/// Capability trait for format-specific text extraction.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Extract the text and metadata of the document at `path`.
    async fn extract(&self, path: &Path) -> Result<Document, ParsingError>;
}

/// Bundled parser for plain-text and Markdown files.
pub struct TextFileParser;

#[async_trait]
impl DocumentParser for TextFileParser {
    async fn extract(&self, path: &Path) -> Result<Document, ParsingError> {
        let format = DocumentFormat::from_path(path)
            .ok_or_else(|| ParsingError::UnsupportedFormat(path.to_path_buf()))?;
        if !matches!(format, DocumentFormat::Text | DocumentFormat::Markdown) {
            return Err(ParsingError::UnsupportedFormat(path.to_path_buf()));
        }

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ParsingError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if text.trim().is_empty() {
            return Err(ParsingError::EmptyDocument(path.to_path_buf()));
        }

        let document = Document::new(path.display().to_string(), text, format);
        tracing::debug!(
            document = %document.id,
            origin = %document.origin,
            chars = document.chars,
            approx_tokens = document.approx_tokens,
            "Extracted document text"
        );
        Ok(document)
    }
}

static TOKEN_ENCODING: OnceLock<Option<CoreBPE>> = OnceLock::new();

/// Estimate the token count of `text`.
///
/// Uses the `cl100k_base` encoding when available and falls back to a
/// whitespace count otherwise, mirroring how chunk budgets are estimated for
/// models without a published tokenizer.
pub fn approx_token_count(text: &str) -> usize {
    let encoding = TOKEN_ENCODING.get_or_init(|| match cl100k_base() {
        Ok(encoding) => Some(encoding),
        Err(error) => {
            tracing::warn!(error = %error, "Tokenizer unavailable; using whitespace counts");
            None
        }
    });

    match encoding {
        Some(encoding) => encoding.encode_ordinary(text).len(),
        None => text.split_whitespace().count(),
    }
}
