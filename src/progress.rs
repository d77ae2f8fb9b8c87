//! Progress-callback trait for per-segment conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::PodcastConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline synthesizes each segment.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a Tokio broadcast channel, a WebSocket, a database
//! record, or a terminal progress bar — without the library knowing anything
//! about how the host application communicates. The trait is `Send + Sync`
//! so it works correctly when segments are synthesized concurrently.

use std::sync::Arc;

/// Called by the conversion pipeline as it processes each segment.
///
/// Implementations must be `Send + Sync` (segments are synthesized
/// concurrently). All methods have default no-op implementations so callers
/// only override what they care about.
///
/// # Thread safety
///
/// `on_segment_start`, `on_segment_complete`, and `on_segment_error` may be
/// called concurrently from different tasks, and completion order does not
/// match segment order. Implementations must protect shared mutable state
/// with appropriate synchronisation primitives (e.g. `Mutex`, `AtomicUsize`).
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after segmentation, before any synthesis call.
    ///
    /// # Arguments
    /// * `total_segments` — number of segments that will be synthesized
    fn on_job_start(&self, total_segments: usize) {
        let _ = total_segments;
    }

    /// Called just before the TTS request is sent for a segment.
    ///
    /// # Arguments
    /// * `index`          — 0-based segment index
    /// * `total_segments` — total segments in the job
    fn on_segment_start(&self, index: usize, total_segments: usize) {
        let _ = (index, total_segments);
    }

    /// Called when a segment is successfully synthesized.
    ///
    /// # Arguments
    /// * `index`          — 0-based segment index
    /// * `total_segments` — total segments
    /// * `audio_bytes`    — byte length of the produced clip
    fn on_segment_complete(&self, index: usize, total_segments: usize, audio_bytes: usize) {
        let _ = (index, total_segments, audio_bytes);
    }

    /// Called when a segment fails permanently (retries exhausted or a
    /// non-retryable error). The job will abort after in-flight segments
    /// wind down.
    ///
    /// # Arguments
    /// * `index`          — 0-based segment index
    /// * `total_segments` — total segments
    /// * `error`          — human-readable error description
    fn on_segment_error(&self, index: usize, total_segments: usize, error: &str) {
        let _ = (index, total_segments, error);
    }

    /// Called once after the job reaches a terminal state.
    ///
    /// # Arguments
    /// * `total_segments` — total segments in the job
    /// * `success_count`  — segments that synthesized without error
    fn on_job_complete(&self, total_segments: usize, success_count: usize) {
        let _ = (total_segments, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PodcastConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        job_total: AtomicUsize,
        job_success: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_job_start(&self, total_segments: usize) {
            self.job_total.store(total_segments, Ordering::SeqCst);
        }

        fn on_segment_start(&self, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_segment_complete(&self, _index: usize, _total: usize, _audio_bytes: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_segment_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_complete(&self, _total: usize, success_count: usize) {
            self.job_success.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_job_start(5);
        cb.on_segment_start(0, 5);
        cb.on_segment_complete(0, 5, 42);
        cb.on_segment_error(1, 5, "some error");
        cb.on_job_complete(5, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            job_total: AtomicUsize::new(0),
            job_success: AtomicUsize::new(0),
        };

        tracker.on_job_start(3);
        assert_eq!(tracker.job_total.load(Ordering::SeqCst), 3);

        tracker.on_segment_start(0, 3);
        tracker.on_segment_complete(0, 3, 100);
        tracker.on_segment_start(1, 3);
        tracker.on_segment_complete(1, 3, 200);
        tracker.on_segment_start(2, 3);
        tracker.on_segment_error(2, 3, "TTS timeout");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);

        tracker.on_job_complete(3, 2);
        assert_eq!(tracker.job_success.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProgressCallback>();

        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_job_start(10);
        cb.on_segment_complete(1, 10, 512);
    }
}
