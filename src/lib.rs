//! # notecast
//!
//! Turn PDF documents into narrated podcast audio.
//!
//! ## Why this crate?
//!
//! Listening is often the only way to get through reading material — on a
//! commute, at the gym, while cooking. notecast extracts the text of a PDF,
//! splits it into speech-sized segments, synthesizes each segment through a
//! pluggable TTS backend, and concatenates the clips into one artifact a
//! podcast player can handle. Partial failures abort loudly: the output
//! either contains every segment in order or it does not exist.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract    per-page text via pdf-extract (CPU-bound, spawn_blocking)
//!  ├─ 2. Segment    sentence-aware chunks ≤ max_chunk_chars
//!  ├─ 3. Synthesize concurrent TTS calls with retry/backoff
//!  ├─ 4. Assemble   one ffmpeg concat run over the ordered clips
//!  └─ 5. Output     merged audio + per-segment transcript and stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use notecast::{convert, PodcastConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Backend auto-detected from OPENAI_API_KEY / NOTECAST_TTS_URL
//!     let config = PodcastConfig::default();
//!     let bytes = std::fs::read("document.pdf")?;
//!     let output = convert(&bytes, &config).await?;
//!     std::fs::write("document.mp3", &output.audio)?;
//!     eprintln!(
//!         "{} segments, {}s of audio",
//!         output.stats.total_segments,
//!         output.stats.audio_duration_ms / 1000
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `notecast` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! notecast = { version = "0.4", default-features = false }
//! ```
//!
//! ## External tools
//!
//! Assembly shells out to `ffmpeg` (or whatever [`PodcastConfig::mux_program`]
//! names) once per job. The muxer runs as an isolated subprocess over files
//! namespaced to the job's private temp directory; nothing is shared across
//! jobs.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod tts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AudioFormat, PodcastConfig, PodcastConfigBuilder};
pub use convert::{
    convert, convert_document, convert_path, convert_sync, convert_to_file, inspect,
};
pub use error::{PipelineStage, PodcastError, SynthesisError};
pub use job::{ConversionJob, JobState};
pub use output::{ConversionOutput, ConversionStats, DocumentMetadata, SegmentReport};
pub use pipeline::extract::Document;
pub use pipeline::segment::Segment;
pub use pipeline::synth::AudioClip;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use tts::{HttpTtsBackend, SpeechOptions, TtsBackend};
