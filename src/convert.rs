//! Conversion entry points and the pipeline orchestrator.
//!
//! The orchestrator is the only place that decides job fate: it owns the
//! [`ConversionJob`] state machine, drives the bounded synthesis pool, and
//! applies the abort policy — any segment's permanent failure (including a
//! transient failure that exhausted its retries) fails the whole job. There
//! is no partial-success output: the artifact either contains every segment
//! in order or it does not exist.

use crate::config::PodcastConfig;
use crate::error::PodcastError;
use crate::job::ConversionJob;
use crate::output::{ConversionOutput, ConversionStats, DocumentMetadata, SegmentReport};
use crate::pipeline::{assemble, extract, segment, synth};
use crate::pipeline::extract::Document;
use crate::tts::{self, SpeechOptions};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Convert raw PDF bytes into one merged audio artifact.
///
/// This is the primary entry point for the library: synchronous from the
/// caller's perspective, internally concurrent up to
/// [`PodcastConfig::concurrency`] TTS calls.
///
/// # Errors
/// Fails fatally — see [`PodcastError`] — on unreadable input, empty
/// content, any segment whose synthesis fails permanently, muxer failure,
/// or cancellation. Caller-fixable cases answer `true` from
/// [`PodcastError::is_caller_error`].
pub async fn convert(
    pdf_bytes: &[u8],
    config: &PodcastConfig,
) -> Result<ConversionOutput, PodcastError> {
    let extract_start = Instant::now();
    let document = extract::extract_document(pdf_bytes).await?;
    let extract_ms = extract_start.elapsed().as_millis() as u64;
    convert_inner(document, config, extract_ms).await
}

/// Convert already-extracted text (text in, audio out).
///
/// Skips the PDF stage entirely; useful when the caller extracted or
/// composed the text itself.
pub async fn convert_document(
    document: Document,
    config: &PodcastConfig,
) -> Result<ConversionOutput, PodcastError> {
    convert_inner(document, config, 0).await
}

/// Convert a PDF file on disk.
pub async fn convert_path(
    path: impl AsRef<Path>,
    config: &PodcastConfig,
) -> Result<ConversionOutput, PodcastError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PodcastError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => PodcastError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => PodcastError::Internal(format!("failed to read '{}': {e}", path.display())),
    })?;
    convert(&bytes, config).await
}

/// Convert a PDF and write the artifact directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    pdf_bytes: &[u8],
    output_path: impl AsRef<Path>,
    config: &PodcastConfig,
) -> Result<ConversionOutput, PodcastError> {
    let output = convert(pdf_bytes, config).await?;
    let path = output_path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PodcastError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                }
            })?;
        }
    }

    let tmp_path = path.with_extension(format!("{}.tmp", output.format.extension()));
    tokio::fs::write(&tmp_path, &output.audio)
        .await
        .map_err(|e| PodcastError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| PodcastError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(output)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    pdf_bytes: &[u8],
    config: &PodcastConfig,
) -> Result<ConversionOutput, PodcastError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PodcastError::Internal(format!("failed to create tokio runtime: {e}")))?
        .block_on(convert(pdf_bytes, config))
}

/// Extract document metadata without synthesizing anything.
///
/// Does not require a TTS backend or a muxer.
pub async fn inspect(pdf_bytes: &[u8]) -> Result<DocumentMetadata, PodcastError> {
    let document = extract::extract_document(pdf_bytes).await?;
    Ok(document.metadata())
}

// ── Orchestrator ─────────────────────────────────────────────────────────

async fn convert_inner(
    document: Document,
    config: &PodcastConfig,
    extract_ms: u64,
) -> Result<ConversionOutput, PodcastError> {
    let total_start = Instant::now();
    let mut job = ConversionJob::new(config.cancel_token.as_ref())?;
    let metadata = document.metadata();

    // ── Step 1: Segment ──────────────────────────────────────────────────
    job.advance()?; // Segmenting
    let segments = segment::segment_document(&document, config.max_chunk_chars);
    if segments.is_empty() {
        job.fail();
        return Err(PodcastError::EmptyContent);
    }
    let total = segments.len();
    info!(
        "segmented {} chars into {} segments (max {})",
        metadata.char_count, total, config.max_chunk_chars
    );

    // ── Step 2: Resolve the TTS backend ──────────────────────────────────
    let backend = match tts::resolve_backend(config) {
        Ok(b) => b,
        Err(e) => {
            job.fail();
            return Err(e);
        }
    };
    info!("TTS backend: {}", backend.name());

    if let Some(ref cb) = config.progress_callback {
        cb.on_job_start(total);
    }

    // ── Step 3: Synthesize concurrently ──────────────────────────────────
    job.advance()?; // Synthesizing
    let synth_start = Instant::now();
    let options = SpeechOptions::from_config(config);
    let cancel = job.cancel_token().clone();

    let synth_futures: Vec<_> = segments
        .iter()
        .map(|seg| {
            let backend = Arc::clone(&backend);
            let options = options.clone();
            let cancel = cancel.clone();
            let cb = config.progress_callback.clone();
            async move {
                if let Some(ref cb) = cb {
                    cb.on_segment_start(seg.sequence_index, total);
                }
                let result =
                    synth::synthesize_segment(&backend, seg, &options, config, &cancel).await;
                if let Some(ref cb) = cb {
                    match &result {
                        Ok(clip) => {
                            cb.on_segment_complete(seg.sequence_index, total, clip.bytes.len())
                        }
                        Err(PodcastError::Cancelled) => {}
                        Err(e) => cb.on_segment_error(seg.sequence_index, total, &e.to_string()),
                    }
                }
                result
            }
        })
        .collect();
    let mut results = stream::iter(synth_futures).buffer_unordered(config.concurrency);

    // Drain every in-flight call even after a failure: cancelling the job
    // token makes them wind down quickly, and draining guarantees no task
    // still holds the workspace when we tear it down.
    let mut clips = Vec::with_capacity(total);
    let mut errors: Vec<PodcastError> = Vec::new();
    while let Some(result) = results.next().await {
        match result {
            Ok(clip) => clips.push(clip),
            Err(err) => {
                if errors.is_empty() {
                    warn!("aborting job: {err}");
                    cancel.cancel();
                }
                errors.push(err);
            }
        }
    }
    drop(results);
    let synth_ms = synth_start.elapsed().as_millis() as u64;

    let externally_cancelled = config
        .cancel_token
        .as_ref()
        .is_some_and(|t| t.is_cancelled());

    if !errors.is_empty() || externally_cancelled {
        job.fail();
        if let Some(ref cb) = config.progress_callback {
            cb.on_job_complete(total, clips.len());
        }
        return Err(select_abort_error(errors, externally_cancelled));
    }

    // ── Step 4: Assemble ─────────────────────────────────────────────────
    job.advance()?; // Assembling
    let assemble_start = Instant::now();
    let audio = match assemble::assemble(&job, &mut clips, config).await {
        Ok(bytes) => bytes,
        Err(e) => {
            job.fail();
            if let Some(ref cb) = config.progress_callback {
                cb.on_job_complete(total, clips.len());
            }
            return Err(e);
        }
    };
    let assemble_ms = assemble_start.elapsed().as_millis() as u64;

    // ── Step 5: Report ───────────────────────────────────────────────────
    job.advance()?; // Completed
    let audio_duration: Duration = clips.iter().map(|c| c.duration).sum();
    let transcript: Vec<SegmentReport> = clips
        .iter()
        .map(|clip| {
            let seg = &segments[clip.sequence_index];
            SegmentReport {
                index: clip.sequence_index,
                page: seg.page,
                text: seg.text.clone(),
                audio_bytes: clip.bytes.len(),
                duration_ms: clip.duration.as_millis() as u64,
                retries: clip.retries,
            }
        })
        .collect();

    let stats = ConversionStats {
        total_segments: total,
        artifact_bytes: audio.len(),
        audio_duration_ms: audio_duration.as_millis() as u64,
        total_retries: clips.iter().map(|c| c.retries as u64).sum(),
        total_duration_ms: total_start.elapsed().as_millis() as u64 + extract_ms,
        extract_duration_ms: extract_ms,
        synth_duration_ms: synth_ms,
        assemble_duration_ms: assemble_ms,
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_job_complete(total, total);
    }
    info!(
        "conversion complete: {} segments, {} bytes, {}ms total",
        total, stats.artifact_bytes, stats.total_duration_ms
    );

    Ok(ConversionOutput {
        audio,
        format: config.format,
        transcript,
        metadata,
        stats,
    })
}

/// Pick the error the job aborts with.
///
/// External cancellation wins; otherwise the real (non-cancellation) error
/// with the lowest segment index — deterministic regardless of completion
/// order, and the index the caller will want to look at first.
fn select_abort_error(errors: Vec<PodcastError>, externally_cancelled: bool) -> PodcastError {
    if externally_cancelled {
        return PodcastError::Cancelled;
    }
    errors
        .into_iter()
        .filter(|e| !matches!(e, PodcastError::Cancelled))
        .min_by_key(|e| e.segment().unwrap_or(usize::MAX))
        .unwrap_or(PodcastError::Cancelled)
}
