//! Text extraction: pull per-page text out of raw PDF bytes.
//!
//! ## Why spawn_blocking?
//!
//! `pdf-extract` parses and decodes the whole document on the calling
//! thread; on large PDFs that is hundreds of milliseconds of CPU-bound work
//! that would stall a Tokio worker. `spawn_blocking` moves it onto the
//! blocking pool. We validate the `%PDF` magic bytes before handing the
//! buffer to the parser so obviously-wrong input gets a precise error
//! instead of a parser backtrace.

use crate::error::PodcastError;
use crate::output::DocumentMetadata;
use tracing::{debug, info};

/// Raw extracted text: one string per page, in page order.
///
/// Immutable once extracted — the segmenter reads it, nothing writes it.
#[derive(Debug, Clone)]
pub struct Document {
    pages: Vec<String>,
}

impl Document {
    pub fn new(pages: Vec<String>) -> Self {
        Self { pages }
    }

    /// Per-page text in page order.
    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    /// True when no page contains a non-whitespace character.
    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.trim().is_empty())
    }

    /// Counters used for inspection and stats.
    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            page_count: self.pages.len(),
            non_empty_pages: self.pages.iter().filter(|p| !p.trim().is_empty()).count(),
            char_count: self.pages.iter().map(|p| p.chars().count()).sum(),
        }
    }
}

/// Extract a [`Document`] from raw PDF bytes.
///
/// # Errors
/// - [`PodcastError::NotAPdf`] when the magic bytes are wrong
/// - [`PodcastError::ExtractionFailed`] when the parser rejects the document
pub async fn extract_document(pdf_bytes: &[u8]) -> Result<Document, PodcastError> {
    validate_magic(pdf_bytes)?;

    let bytes = pdf_bytes.to_vec();
    let pages = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| {
            PodcastError::ExtractionFailed {
                detail: e.to_string(),
            }
        })
    })
    .await
    .map_err(|e| {
        // The parser panicking on malformed input is an input problem,
        // not an internal one.
        if e.is_panic() {
            PodcastError::ExtractionFailed {
                detail: "PDF parser panicked on this document".to_string(),
            }
        } else {
            PodcastError::Internal(format!("extraction task failed: {e}"))
        }
    })??;

    let document = Document::new(pages);
    let meta = document.metadata();
    info!(
        "extracted {} chars from {} pages ({} non-empty)",
        meta.char_count, meta.page_count, meta.non_empty_pages
    );
    debug!("document empty: {}", document.is_empty());
    Ok(document)
}

/// Check the `%PDF` magic without touching the parser.
fn validate_magic(bytes: &[u8]) -> Result<(), PodcastError> {
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    if &magic != b"%PDF" {
        return Err(PodcastError::NotAPdf { magic });
    }
    Ok(())
}
