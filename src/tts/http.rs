//! HTTP TTS backend speaking the OpenAI-compatible speech protocol.
//!
//! One JSON POST per segment: `{model, input, voice, response_format,
//! speed}` in, encoded audio bytes out. Several hosted and self-hosted
//! engines expose this shape (OpenAI, LocalAI, Kokoro-FastAPI, OpenedAI
//! Speech), so a single backend covers all of them behind a base URL.
//!
//! Failure classification lives in [`classify_status`], kept as a pure
//! function so the transient/permanent mapping is testable without a
//! server.

use crate::config::AudioFormat;
use crate::error::{PodcastError, SynthesisError};
use crate::tts::{SpeechOptions, TtsBackend};
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tracing::debug;

/// Bodies smaller than this cannot be a real audio clip — even a fraction
/// of a second of MP3 or a bare WAV header exceeds it. The original service
/// this pipeline replaces used the same guard against truncated TTS output.
const MIN_CLIP_BYTES: usize = 64;

/// How much of an error-response body to keep in the error detail.
const MAX_DETAIL_BYTES: usize = 300;

/// OpenAI-compatible `/v1/audio/speech` backend.
pub struct HttpTtsBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    format: AudioFormat,
    timeout: Duration,
}

impl HttpTtsBackend {
    /// Create a backend for `endpoint` (the full speech-endpoint URL).
    pub fn new(endpoint: impl Into<String>, api_key: Option<&str>) -> Result<Self, PodcastError> {
        let timeout = Duration::from_secs(60);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PodcastError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.map(str::to_string),
            model: "tts-1".to_string(),
            format: AudioFormat::Mp3,
            timeout,
        })
    }

    /// Override the TTS model (default "tts-1").
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the requested response format (default MP3).
    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    /// Override the per-call timeout (default 60s).
    ///
    /// Rebuilds the inner client; reqwest timeouts are set at build time.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        if let Ok(client) = reqwest::Client::builder().timeout(self.timeout).build() {
            self.client = client;
        }
        self
    }
}

#[async_trait::async_trait]
impl TtsBackend for HttpTtsBackend {
    async fn synthesize(
        &self,
        text: &str,
        options: &SpeechOptions,
    ) -> Result<Vec<u8>, SynthesisError> {
        let started = Instant::now();
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": options.voice,
            "response_format": self.format.api_name(),
            "speed": options.speed,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SynthesisError::Timeout {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                }
            } else {
                SynthesisError::Unavailable {
                    detail: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(&response);
            let detail = truncate(&response.text().await.unwrap_or_default());
            return Err(classify_status(status, retry_after, detail));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::Unavailable {
                detail: format!("failed to read audio body: {e}"),
            })?;

        if bytes.len() < MIN_CLIP_BYTES {
            return Err(SynthesisError::EmptyAudio { bytes: bytes.len() });
        }

        debug!(
            "synthesized {} chars -> {} bytes in {:?}",
            text.len(),
            bytes.len(),
            started.elapsed()
        );
        Ok(bytes.to_vec())
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn name(&self) -> &str {
        "http-speech"
    }
}

/// Map a non-success HTTP status to a [`SynthesisError`].
///
/// 429 and 5xx are transient; auth failures and the remaining 4xx are
/// permanent (the same request cannot succeed on retry).
fn classify_status(
    status: StatusCode,
    retry_after: Option<u64>,
    detail: String,
) -> SynthesisError {
    match status.as_u16() {
        429 => SynthesisError::RateLimited {
            retry_after_secs: retry_after,
        },
        401 | 403 => SynthesisError::Auth { detail },
        408 => SynthesisError::Timeout { elapsed_ms: 0 },
        500..=599 => SynthesisError::Unavailable {
            detail: format!("HTTP {status}: {detail}"),
        },
        _ => SynthesisError::Rejected {
            detail: format!("HTTP {status}: {detail}"),
        },
    }
}

/// Read a server-specified backoff from the `Retry-After` header, if any.
fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn truncate(s: &str) -> String {
    if s.len() <= MAX_DETAIL_BYTES {
        s.to_string()
    } else {
        let mut end = MAX_DETAIL_BYTES;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
