//! Pipeline stages for PDF-to-podcast conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. switch the TTS protocol) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ segment ──▶ synth ──▶ assemble
//! (pdf text)  (chunks)    (clips)   (one artifact)
//! ```
//!
//! 1. [`extract`]  — pull per-page text out of the PDF bytes; runs in
//!    `spawn_blocking` because the parser is CPU-bound
//! 2. [`segment`]  — split the text into ordered, bounded chunks at sentence
//!    boundaries
//! 3. [`synth`]    — drive one TTS call per chunk with retry/backoff; the
//!    only stage with network I/O
//! 4. [`probe`]    — read clip durations out of the encoded bytes (WAV/MP3
//!    headers)
//! 5. [`assemble`] — write the ordered clips to disk and run the external
//!    muxer once over the full list

pub mod assemble;
pub mod extract;
pub mod probe;
pub mod segment;
pub mod synth;
