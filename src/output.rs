//! Output types: the final artifact, per-segment transcript, and stats.
//!
//! Everything here derives `Serialize` so a caller (or the CLI's
//! `--transcript` flag) can persist the full conversion record as JSON —
//! the artifact bytes themselves are skipped during serialisation.

use crate::config::AudioFormat;
use serde::{Deserialize, Serialize};

/// The result of a successful conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// The merged audio artifact.
    #[serde(skip)]
    pub audio: Vec<u8>,

    /// Container/encoding of `audio`.
    pub format: AudioFormat,

    /// Per-segment record in sequence order — what was spoken, from which
    /// page, and how long the clip ran.
    pub transcript: Vec<SegmentReport>,

    /// Metadata about the source document.
    pub metadata: DocumentMetadata,

    /// Timing and size statistics for the conversion.
    pub stats: ConversionStats,
}

/// One entry of the spoken transcript, in segment order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentReport {
    /// 0-based segment index; equals this entry's position in the transcript.
    pub index: usize,
    /// 0-based index of the source page the segment text came from.
    pub page: usize,
    /// The synthesized text.
    pub text: String,
    /// Clip length in bytes.
    pub audio_bytes: usize,
    /// Clip duration in milliseconds (0 if the clip could not be probed).
    pub duration_ms: u64,
    /// Retry attempts spent on this segment (0 = first attempt succeeded).
    pub retries: u32,
}

/// Metadata about the source document, available without synthesis
/// via [`crate::convert::inspect`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Total pages in the document.
    pub page_count: usize,
    /// Pages with at least one non-whitespace character.
    pub non_empty_pages: usize,
    /// Total extracted characters across all pages.
    pub char_count: usize,
}

/// Timing and size statistics for one conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Number of segments the document was split into.
    pub total_segments: usize,
    /// Total bytes of the merged artifact.
    pub artifact_bytes: usize,
    /// Summed duration of all clips, in milliseconds.
    pub audio_duration_ms: u64,
    /// Total retry attempts spent across all segments.
    pub total_retries: u64,
    /// Wall-clock time for the whole conversion.
    pub total_duration_ms: u64,
    /// Wall-clock time spent extracting text.
    pub extract_duration_ms: u64,
    /// Wall-clock time spent in synthesis (all segments, concurrent).
    pub synth_duration_ms: u64,
    /// Wall-clock time spent assembling the artifact.
    pub assemble_duration_ms: u64,
}
