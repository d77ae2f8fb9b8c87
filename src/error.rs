//! Error types for the notecast library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PodcastError`] — **Fatal**: the conversion job cannot produce an
//!   artifact (unreadable document, no extractable text, a segment that
//!   failed permanently, muxer failure). Returned as `Err(PodcastError)`
//!   from the top-level `convert*` functions.
//!
//! * [`SynthesisError`] — **Per-clip**: one TTS call failed. Carries the
//!   transient/permanent distinction that drives the retry policy: transient
//!   failures (timeout, rate limit, 5xx) are retried with backoff, permanent
//!   ones (rejected input, auth, empty audio) are not. A transient failure
//!   that exhausts its retries escalates into the fatal
//!   [`PodcastError::SynthesisFailed`] — it is never silently skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Identity of the pipeline component an error originated in.
///
/// Attached to every fatal error via [`PodcastError::stage`] so callers can
/// report *which* part of the pipeline failed without string-matching
/// error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Extraction,
    Segmentation,
    Synthesis,
    Assembly,
    Output,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineStage::Extraction => "extraction",
            PipelineStage::Segmentation => "segmentation",
            PipelineStage::Synthesis => "synthesis",
            PipelineStage::Assembly => "assembly",
            PipelineStage::Output => "output",
        };
        f.write_str(s)
    }
}

/// All fatal errors returned by the notecast library.
///
/// Per-clip TTS failures use [`SynthesisError`] and reach this type only
/// wrapped in [`PodcastError::SynthesisFailed`], together with the segment
/// index and the retry count that was spent on it.
#[derive(Debug, Error)]
pub enum PodcastError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input bytes are not a PDF document.
    #[error("Input is not a valid PDF document\nFirst bytes: {magic:?} (expected %PDF)")]
    NotAPdf { magic: [u8; 4] },

    /// The PDF parser could not read the document.
    #[error("Failed to extract text from the PDF: {detail}\nThe document may be corrupt or encrypted.")]
    ExtractionFailed { detail: String },

    /// The document parsed fine but contains no extractable text.
    #[error(
        "The document contains no extractable text.\n\
         Scanned/image-only PDFs are not supported — run OCR first."
    )]
    EmptyContent,

    // ── Synthesis errors ──────────────────────────────────────────────────
    /// No TTS backend could be resolved from config or environment.
    #[error("No TTS backend is configured.\n{hint}")]
    BackendNotConfigured { hint: String },

    /// A segment failed to synthesize and aborted the job.
    ///
    /// `retries` is the number of retry attempts that were spent before
    /// giving up; 0 means the failure was permanent and never retried.
    #[error("Speech synthesis failed for segment {segment} after {retries} retries: {source}")]
    SynthesisFailed {
        segment: usize,
        retries: u32,
        #[source]
        source: SynthesisError,
    },

    // ── Assembly errors ───────────────────────────────────────────────────
    /// The ordered clip sequence has a hole — a segment produced no clip.
    ///
    /// This is a pipeline invariant violation, never a condition to skip
    /// over: the merged audio must contain every segment exactly once.
    #[error("Clip sequence is broken: expected clip {expected}, found {found}")]
    ClipSequenceGap { expected: usize, found: usize },

    /// The muxer binary could not be spawned.
    #[error(
        "Audio muxer '{program}' could not be started.\n\
         Install ffmpeg or point the `mux_program` config at an equivalent tool."
    )]
    MuxerNotFound { program: String },

    /// The muxer ran but exited with a failure.
    #[error("Audio muxer '{program}' failed (exit code {code:?}):\n{stderr}")]
    MuxerFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The muxer did not finish within the configured timeout.
    #[error("Audio muxer '{program}' timed out after {secs}s\nIncrease `mux_timeout_secs` for very long documents.")]
    MuxerTimeout { program: String, secs: u64 },

    // ── Job errors ────────────────────────────────────────────────────────
    /// The job was cancelled before it completed.
    #[error("Conversion was cancelled before completion")]
    Cancelled,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output audio file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PodcastError {
    /// The pipeline component this error originated in.
    pub fn stage(&self) -> PipelineStage {
        match self {
            PodcastError::FileNotFound { .. }
            | PodcastError::PermissionDenied { .. }
            | PodcastError::NotAPdf { .. }
            | PodcastError::ExtractionFailed { .. } => PipelineStage::Extraction,
            PodcastError::EmptyContent => PipelineStage::Segmentation,
            PodcastError::BackendNotConfigured { .. } | PodcastError::SynthesisFailed { .. } => {
                PipelineStage::Synthesis
            }
            PodcastError::ClipSequenceGap { .. }
            | PodcastError::MuxerNotFound { .. }
            | PodcastError::MuxerFailed { .. }
            | PodcastError::MuxerTimeout { .. } => PipelineStage::Assembly,
            PodcastError::Cancelled
            | PodcastError::OutputWriteFailed { .. }
            | PodcastError::InvalidConfig(_)
            | PodcastError::Internal(_) => PipelineStage::Output,
        }
    }

    /// Whether the caller can fix this by changing their input
    /// (the HTTP layer above maps these to 4xx, everything else to 5xx).
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            PodcastError::FileNotFound { .. }
                | PodcastError::PermissionDenied { .. }
                | PodcastError::NotAPdf { .. }
                | PodcastError::ExtractionFailed { .. }
                | PodcastError::EmptyContent
                | PodcastError::InvalidConfig(_)
        )
    }

    /// The 0-based segment index this error relates to, where applicable.
    pub fn segment(&self) -> Option<usize> {
        match self {
            PodcastError::SynthesisFailed { segment, .. } => Some(*segment),
            PodcastError::ClipSequenceGap { expected, .. } => Some(*expected),
            _ => None,
        }
    }
}

/// A single failed TTS call.
///
/// Produced by [`crate::tts::TtsBackend`] implementations. The
/// [`is_transient`](SynthesisError::is_transient) split is the contract the
/// retry loop in [`crate::pipeline::synth`] is built on: backends must map
/// their wire-level failures into exactly one of these variants rather than
/// leaking provider-specific shapes into the pipeline.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum SynthesisError {
    /// The TTS request timed out. Transient.
    #[error("TTS request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The backend rate-limited the request (HTTP 429). Transient.
    #[error("TTS backend rate-limited the request")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The backend or the network path to it is unavailable (5xx,
    /// connection refused). Transient.
    #[error("TTS backend unavailable: {detail}")]
    Unavailable { detail: String },

    /// The backend rejected the input text (4xx other than auth/429).
    /// Permanent — retrying the same text cannot succeed.
    #[error("TTS backend rejected the input: {detail}")]
    Rejected { detail: String },

    /// Authentication failed (401/403). Permanent.
    #[error("TTS backend authentication failed: {detail}")]
    Auth { detail: String },

    /// The backend returned no audio, or too few bytes to be a real clip.
    /// Permanent.
    #[error("TTS backend returned an implausibly small audio stream ({bytes} bytes)")]
    EmptyAudio { bytes: usize },
}

impl SynthesisError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SynthesisError::Timeout { .. }
                | SynthesisError::RateLimited { .. }
                | SynthesisError::Unavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(SynthesisError::Timeout { elapsed_ms: 5000 }.is_transient());
        assert!(SynthesisError::RateLimited {
            retry_after_secs: Some(2)
        }
        .is_transient());
        assert!(SynthesisError::Unavailable {
            detail: "503".into()
        }
        .is_transient());
        assert!(!SynthesisError::Rejected {
            detail: "input too long".into()
        }
        .is_transient());
        assert!(!SynthesisError::Auth {
            detail: "bad key".into()
        }
        .is_transient());
        assert!(!SynthesisError::EmptyAudio { bytes: 12 }.is_transient());
    }

    #[test]
    fn synthesis_failed_display_carries_segment() {
        let e = PodcastError::SynthesisFailed {
            segment: 7,
            retries: 3,
            source: SynthesisError::Timeout { elapsed_ms: 60000 },
        };
        let msg = e.to_string();
        assert!(msg.contains("segment 7"), "got: {msg}");
        assert!(msg.contains("3 retries"), "got: {msg}");
    }

    #[test]
    fn stage_attribution() {
        assert_eq!(
            PodcastError::EmptyContent.stage(),
            PipelineStage::Segmentation
        );
        assert_eq!(
            PodcastError::MuxerNotFound {
                program: "ffmpeg".into()
            }
            .stage(),
            PipelineStage::Assembly
        );
        assert_eq!(
            PodcastError::SynthesisFailed {
                segment: 0,
                retries: 0,
                source: SynthesisError::EmptyAudio { bytes: 0 },
            }
            .stage(),
            PipelineStage::Synthesis
        );
    }

    #[test]
    fn caller_error_mapping() {
        assert!(PodcastError::EmptyContent.is_caller_error());
        assert!(PodcastError::NotAPdf { magic: *b"<htm" }.is_caller_error());
        assert!(!PodcastError::MuxerTimeout {
            program: "ffmpeg".into(),
            secs: 60
        }
        .is_caller_error());
        assert!(!PodcastError::Cancelled.is_caller_error());
    }

    #[test]
    fn clip_gap_reports_expected_index() {
        let e = PodcastError::ClipSequenceGap {
            expected: 4,
            found: 6,
        };
        assert_eq!(e.segment(), Some(4));
        assert!(e.to_string().contains("expected clip 4"));
    }
}
