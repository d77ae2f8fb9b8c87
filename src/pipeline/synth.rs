//! Synthesis adapter: drive one TTS call per segment, with retry.
//!
//! ## Retry Strategy
//!
//! Speech endpoints rate-limit and time out routinely under concurrent
//! load. Transient failures are retried up to `max_retries` times with
//! exponential backoff (`retry_backoff_ms * 2^attempt`): with the 500 ms
//! default and 3 retries the wait sequence is 500 ms → 1 s → 2 s. A
//! server-provided `Retry-After` extends the computed backoff when it is
//! longer. Permanent failures (rejected input, bad credentials, empty
//! audio) are never retried, and a transient failure that exhausts its
//! retries escalates to the same fatal error — the orchestrator never sees
//! a half-synthesized job as a success.
//!
//! Every wait and every in-flight call races the job's cancellation token,
//! so a cancelled job stops issuing work within one await point.

use crate::config::{AudioFormat, PodcastConfig};
use crate::error::PodcastError;
use crate::pipeline::probe;
use crate::pipeline::segment::Segment;
use crate::tts::{SpeechOptions, TtsBackend};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The synthesized audio for exactly one segment.
///
/// Normalised at the adapter boundary: whatever the backend returned is
/// reduced to bytes + declared format + probed duration here, so the rest
/// of the pipeline never branches on backend-specific shapes.
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// Matches the originating segment's `sequence_index`.
    pub sequence_index: usize,
    /// Encoded audio.
    pub bytes: Vec<u8>,
    /// Container/encoding of `bytes`, as declared by the backend.
    pub format: AudioFormat,
    /// Probed duration; `Duration::ZERO` when the container was unreadable.
    pub duration: Duration,
    /// Retry attempts spent (0 = first attempt succeeded).
    pub retries: u32,
}

/// Synthesize one segment into an [`AudioClip`].
///
/// Returns [`PodcastError::Cancelled`] as soon as `cancel` fires, and
/// [`PodcastError::SynthesisFailed`] — carrying the segment index and the
/// retry count — for any failure that survives the retry policy.
pub async fn synthesize_segment(
    backend: &Arc<dyn TtsBackend>,
    segment: &Segment,
    options: &SpeechOptions,
    config: &PodcastConfig,
    cancel: &CancellationToken,
) -> Result<AudioClip, PodcastError> {
    let started = Instant::now();
    let mut attempt: u32 = 0;
    let mut server_backoff: Option<u64> = None;

    loop {
        if attempt > 0 {
            let exp = config
                .retry_backoff_ms
                .saturating_mul(2u64.saturating_pow(attempt - 1));
            let backoff = server_backoff.map_or(exp, |s| exp.max(s * 1000));
            warn!(
                "segment {}: retry {}/{} after {}ms",
                segment.sequence_index, attempt, config.max_retries, backoff
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PodcastError::Cancelled),
                _ = sleep(Duration::from_millis(backoff)) => {}
            }
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PodcastError::Cancelled),
            r = backend.synthesize(&segment.text, options) => r,
        };

        match result {
            Ok(bytes) => {
                let duration = probe::probe_duration(&bytes).unwrap_or_else(|| {
                    debug!(
                        "segment {}: could not probe clip duration",
                        segment.sequence_index
                    );
                    Duration::ZERO
                });
                debug!(
                    "segment {}: {} chars -> {} bytes ({:?} audio) in {:?}, {} retries",
                    segment.sequence_index,
                    segment.text.len(),
                    bytes.len(),
                    duration,
                    started.elapsed(),
                    attempt
                );
                return Ok(AudioClip {
                    sequence_index: segment.sequence_index,
                    bytes,
                    format: backend.format(),
                    duration,
                    retries: attempt,
                });
            }
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                warn!(
                    "segment {}: attempt {} failed — {}",
                    segment.sequence_index,
                    attempt + 1,
                    err
                );
                if let crate::error::SynthesisError::RateLimited {
                    retry_after_secs: Some(secs),
                } = err
                {
                    server_backoff = Some(secs);
                } else {
                    server_backoff = None;
                }
                attempt += 1;
            }
            Err(err) => {
                return Err(PodcastError::SynthesisFailed {
                    segment: segment.sequence_index,
                    retries: attempt,
                    source: err,
                });
            }
        }
    }
}
