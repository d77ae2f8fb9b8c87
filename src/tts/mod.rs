//! Pluggable text-to-speech backends.
//!
//! The pipeline never talks to a speech API directly; it goes through the
//! [`TtsBackend`] trait and receives plain encoded audio bytes back. Whatever
//! shape a provider's response has, it is normalised at this boundary — the
//! rest of the pipeline branches only on [`crate::error::SynthesisError`]'s
//! transient/permanent split and on the declared [`AudioFormat`].
//!
//! One production backend ships with the crate ([`http::HttpTtsBackend`],
//! speaking the OpenAI-compatible `/v1/audio/speech` protocol); tests and
//! embedders inject their own via [`crate::config::PodcastConfig::backend`].

pub mod http;

use crate::config::{AudioFormat, PodcastConfig};
use crate::error::{PodcastError, SynthesisError};
use std::sync::Arc;

pub use http::HttpTtsBackend;

/// Per-call synthesis options, carried separately from the backend so one
/// backend instance can serve jobs with different voices.
#[derive(Debug, Clone)]
pub struct SpeechOptions {
    /// Voice identifier, interpreted by the backend.
    pub voice: String,
    /// Speaking-rate multiplier (1.0 = normal).
    pub speed: f32,
}

impl SpeechOptions {
    /// Extract the speech options a config asks for.
    pub fn from_config(config: &PodcastConfig) -> Self {
        Self {
            voice: config.voice.clone(),
            speed: config.speed,
        }
    }
}

/// A text-to-speech engine: one call turns one text chunk into one encoded
/// audio clip.
///
/// Implementations must be `Send + Sync`; the pipeline issues calls for
/// distinct segments concurrently from a bounded task set. Implementations
/// must classify every failure as transient or permanent via the
/// [`SynthesisError`] variant they return — the retry loop acts on that
/// distinction alone.
#[async_trait::async_trait]
pub trait TtsBackend: Send + Sync {
    /// Synthesize `text` into encoded audio bytes in [`Self::format`].
    async fn synthesize(
        &self,
        text: &str,
        options: &SpeechOptions,
    ) -> Result<Vec<u8>, SynthesisError>;

    /// Container/encoding of the bytes this backend produces.
    fn format(&self) -> AudioFormat;

    /// Short identifier for logs and `Debug` output.
    fn name(&self) -> &str;
}

/// Resolve the TTS backend, from most-specific to least-specific.
///
/// The fallback chain lets library users and CLI users each set exactly as
/// much or as little as they need:
///
/// 1. **Pre-built backend** (`config.backend`) — the caller constructed and
///    configured the backend entirely; we use it as-is. Useful in tests or
///    when the caller needs custom middleware (caching, rate-limiting).
///
/// 2. **Configured URL** (`config.backend_url`) — the caller named a speech
///    endpoint; the API key comes from `config.api_key` or the environment.
///
/// 3. **Environment URL** (`NOTECAST_TTS_URL`) — the endpoint was chosen at
///    the execution-environment level (Makefile, shell script, CI).
///
/// 4. **OpenAI key** (`OPENAI_API_KEY`) — no endpoint anywhere, but an
///    OpenAI key is present: use the official speech endpoint. Convenient
///    for `notecast document.pdf` with no other configuration.
pub fn resolve_backend(config: &PodcastConfig) -> Result<Arc<dyn TtsBackend>, PodcastError> {
    // 1) User-provided backend takes priority
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    // 2) Configured endpoint URL
    if let Some(ref url) = config.backend_url {
        return http_backend(url, config);
    }

    // 3) Endpoint from the environment
    if let Ok(url) = std::env::var("NOTECAST_TTS_URL") {
        if !url.is_empty() {
            return http_backend(&url, config);
        }
    }

    // 4) OpenAI key present: default to the official endpoint
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.is_empty() {
            return http_backend("https://api.openai.com/v1/audio/speech", config);
        }
    }

    Err(PodcastError::BackendNotConfigured {
        hint: "Set OPENAI_API_KEY, or NOTECAST_TTS_URL (+ NOTECAST_TTS_API_KEY) for an \
               OpenAI-compatible speech endpoint, or inject a backend via \
               PodcastConfig::builder().backend(..)."
            .to_string(),
    })
}

/// Build the bundled HTTP backend for `url` with the config's knobs applied.
fn http_backend(url: &str, config: &PodcastConfig) -> Result<Arc<dyn TtsBackend>, PodcastError> {
    let api_key = resolve_api_key(config);
    let mut backend = HttpTtsBackend::new(url, api_key.as_deref())?
        .with_format(config.format)
        .with_timeout_secs(config.speech_timeout_secs);
    if let Some(ref model) = config.model {
        backend = backend.with_model(model.as_str());
    }
    Ok(Arc::new(backend))
}

/// API key precedence: explicit config, then notecast-specific env var,
/// then the generic OpenAI variable.
fn resolve_api_key(config: &PodcastConfig) -> Option<String> {
    if let Some(ref key) = config.api_key {
        return Some(key.clone());
    }
    for var in ["NOTECAST_TTS_API_KEY", "OPENAI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                return Some(key);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SilentBackend;

    #[async_trait::async_trait]
    impl TtsBackend for SilentBackend {
        async fn synthesize(
            &self,
            _text: &str,
            _options: &SpeechOptions,
        ) -> Result<Vec<u8>, SynthesisError> {
            Ok(vec![0u8; 128])
        }

        fn format(&self) -> AudioFormat {
            AudioFormat::Wav
        }

        fn name(&self) -> &str {
            "silent"
        }
    }

    #[test]
    fn prebuilt_backend_wins() {
        let config = PodcastConfig::builder()
            .backend(Arc::new(SilentBackend))
            .backend_url("http://localhost:9/ignored")
            .build()
            .unwrap();
        let backend = resolve_backend(&config).unwrap();
        assert_eq!(backend.name(), "silent");
    }

    #[test]
    fn configured_url_builds_http_backend() {
        let config = PodcastConfig::builder()
            .backend_url("http://localhost:8080/v1/audio/speech")
            .api_key("test-key")
            .model("tts-1-hd")
            .build()
            .unwrap();
        let backend = resolve_backend(&config).unwrap();
        assert_eq!(backend.name(), "http-speech");
        assert_eq!(backend.format(), AudioFormat::Mp3);
    }

    #[test]
    fn speech_options_mirror_config() {
        let config = PodcastConfig::builder()
            .voice("nova")
            .speed(1.5)
            .build()
            .unwrap();
        let opts = SpeechOptions::from_config(&config);
        assert_eq!(opts.voice, "nova");
        assert!((opts.speed - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn explicit_api_key_beats_environment() {
        let config = PodcastConfig::builder().api_key("explicit").build().unwrap();
        assert_eq!(resolve_api_key(&config).as_deref(), Some("explicit"));
    }
}
