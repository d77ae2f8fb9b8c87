//! Configuration types for PDF-to-podcast conversion.
//!
//! All conversion behaviour is controlled through [`PodcastConfig`], built
//! via its [`PodcastConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across jobs, log them, and diff two runs to
//! understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::PodcastError;
use crate::progress::ProgressCallback;
use crate::tts::TtsBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Configuration for one PDF-to-podcast conversion.
///
/// Built via [`PodcastConfig::builder()`] or using
/// [`PodcastConfig::default()`].
///
/// # Example
/// ```rust
/// use notecast::PodcastConfig;
///
/// let config = PodcastConfig::builder()
///     .max_chunk_chars(2000)
///     .concurrency(2)
///     .voice("nova")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PodcastConfig {
    /// Maximum characters per text segment sent to the TTS backend. Default: 3000.
    ///
    /// TTS endpoints cap input length (OpenAI-compatible speech endpoints at
    /// 4096 characters), and shorter segments parallelise better. 3000 leaves
    /// headroom for the cap while keeping the clip count — and therefore the
    /// number of billable API calls — low.
    pub max_chunk_chars: usize,

    /// Number of concurrent TTS calls. Default: 4.
    ///
    /// Synthesis is network-bound, so concurrency cuts wall-clock time
    /// roughly linearly — until the backend rate-limits. Speech endpoints
    /// throttle much earlier than chat endpoints, so the default stays
    /// conservative. If you see 429 retries in the logs, lower this.
    pub concurrency: usize,

    /// Maximum retry attempts on a transient TTS failure. Default: 3.
    ///
    /// Most timeout and 5xx errors clear within seconds. Permanent failures
    /// (rejected input, bad API key) are never retried — they abort the job
    /// immediately.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s. Exponential backoff
    /// avoids the thundering-herd problem where N concurrent workers retry
    /// simultaneously and immediately overwhelm a recovering endpoint.
    pub retry_backoff_ms: u64,

    /// Voice identifier passed through to the TTS backend. Default: "alloy".
    ///
    /// Opaque to the pipeline; each backend interprets it.
    pub voice: String,

    /// Speaking-rate multiplier passed through to the TTS backend. Default: 1.0.
    pub speed: f32,

    /// TTS model identifier for the HTTP backend, e.g. "tts-1" or "tts-1-hd".
    /// If None, the backend default is used.
    pub model: Option<String>,

    /// Container/encoding of the synthesized clips and the final artifact.
    /// Default: [`AudioFormat::Mp3`].
    pub format: AudioFormat,

    /// Pre-constructed TTS backend. Takes precedence over `backend_url`.
    pub backend: Option<Arc<dyn TtsBackend>>,

    /// Speech-endpoint URL for the bundled HTTP backend
    /// (e.g. "https://api.openai.com/v1/audio/speech").
    /// If None along with `backend`, the environment is consulted.
    pub backend_url: Option<String>,

    /// API key for the HTTP backend. If None, read from the environment
    /// (`NOTECAST_TTS_API_KEY`, then `OPENAI_API_KEY`).
    pub api_key: Option<String>,

    /// Per-TTS-call timeout in seconds. Default: 60.
    pub speech_timeout_secs: u64,

    /// External muxer binary used to concatenate clips. Default: "ffmpeg".
    ///
    /// Must understand ffmpeg's concat-demuxer CLI. Overridable mainly for
    /// tests and for pinning an absolute path in locked-down deployments.
    pub mux_program: String,

    /// Timeout for the muxer subprocess in seconds. Default: 60.
    pub mux_timeout_secs: u64,

    /// Per-segment progress events. Default: none.
    pub progress_callback: Option<ProgressCallback>,

    /// Cancellation token observed by the job. Default: none.
    ///
    /// Cancelling it makes in-flight synthesis calls wind down cooperatively
    /// and the job fail with [`PodcastError::Cancelled`]; no partial artifact
    /// is ever exposed.
    pub cancel_token: Option<CancellationToken>,
}

impl Default for PodcastConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 3000,
            concurrency: 4,
            max_retries: 3,
            retry_backoff_ms: 500,
            voice: "alloy".to_string(),
            speed: 1.0,
            model: None,
            format: AudioFormat::default(),
            backend: None,
            backend_url: None,
            api_key: None,
            speech_timeout_secs: 60,
            mux_program: "ffmpeg".to_string(),
            mux_timeout_secs: 60,
            progress_callback: None,
            cancel_token: None,
        }
    }
}

impl fmt::Debug for PodcastConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PodcastConfig")
            .field("max_chunk_chars", &self.max_chunk_chars)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("voice", &self.voice)
            .field("speed", &self.speed)
            .field("model", &self.model)
            .field("format", &self.format)
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field("backend_url", &self.backend_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("speech_timeout_secs", &self.speech_timeout_secs)
            .field("mux_program", &self.mux_program)
            .field("mux_timeout_secs", &self.mux_timeout_secs)
            .finish()
    }
}

impl PodcastConfig {
    /// Create a new builder for `PodcastConfig`.
    pub fn builder() -> PodcastConfigBuilder {
        PodcastConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PodcastConfig`].
pub struct PodcastConfigBuilder {
    config: PodcastConfig,
}

impl PodcastConfigBuilder {
    pub fn max_chunk_chars(mut self, n: usize) -> Self {
        self.config.max_chunk_chars = n.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.config.voice = voice.into();
        self
    }

    pub fn speed(mut self, speed: f32) -> Self {
        self.config.speed = speed.clamp(0.25, 4.0);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn format(mut self, format: AudioFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn backend(mut self, backend: Arc<dyn TtsBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn backend_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn speech_timeout_secs(mut self, secs: u64) -> Self {
        self.config.speech_timeout_secs = secs;
        self
    }

    pub fn mux_program(mut self, program: impl Into<String>) -> Self {
        self.config.mux_program = program.into();
        self
    }

    pub fn mux_timeout_secs(mut self, secs: u64) -> Self {
        self.config.mux_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.config.cancel_token = Some(token);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PodcastConfig, PodcastError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(PodcastError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if c.max_chunk_chars == 0 {
            return Err(PodcastError::InvalidConfig(
                "max_chunk_chars must be ≥ 1".into(),
            ));
        }
        if c.mux_program.trim().is_empty() {
            return Err(PodcastError::InvalidConfig(
                "mux_program must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Audio container/encoding for clips and the final artifact.
///
/// Only formats that both the speech endpoints and the concat muxer handle
/// losslessly are offered. MP3 is the default because podcast players expect
/// it and because `-c copy` concatenation of same-codec MP3 clips needs no
/// re-encode; WAV exists for tests and for callers that post-process audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// MPEG layer III. (default)
    #[default]
    Mp3,
    /// RIFF/WAVE, 16-bit PCM.
    Wav,
}

impl AudioFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }

    /// The `response_format` value OpenAI-compatible speech endpoints expect.
    pub fn api_name(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }

    /// MIME type of the final artifact.
    pub fn mime(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = PodcastConfig::default();
        assert_eq!(c.max_chunk_chars, 3000);
        assert_eq!(c.concurrency, 4);
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.retry_backoff_ms, 500);
        assert_eq!(c.format, AudioFormat::Mp3);
        assert_eq!(c.mux_program, "ffmpeg");
    }

    #[test]
    fn builder_clamps_degenerate_values() {
        let c = PodcastConfig::builder()
            .concurrency(0)
            .max_chunk_chars(0)
            .speed(10.0)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_chunk_chars, 1);
        assert!((c.speed - 4.0).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_mux_program_rejected() {
        let err = PodcastConfig::builder().mux_program("  ").build();
        assert!(matches!(err, Err(PodcastError::InvalidConfig(_))));
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = PodcastConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn format_names() {
        assert_eq!(AudioFormat::Mp3.extension(), "mp3");
        assert_eq!(AudioFormat::Wav.mime(), "audio/wav");
        assert_eq!(AudioFormat::Wav.api_name(), "wav");
    }
}
