//! Assembly: merge the ordered clips into one audio artifact.
//!
//! The mechanical joiner is an external muxer (ffmpeg's concat demuxer by
//! default), invoked exactly once over the full ordered list — pairwise
//! joining would re-encode repeatedly and accumulate timing drift. When
//! every clip already carries the target format the muxer runs in `-c copy`
//! mode and never touches the audio data; mixed formats are normalised by
//! a single re-encode to the configured format.
//!
//! Failure discipline: a non-zero exit, a missing/empty output file, a
//! spawn failure, or a timeout all surface as fatal assembly errors, and
//! any partial output is deleted *before* the error is returned so no
//! caller can mistake a half-written file for a result. The clip files and
//! list file live in the job's workspace and disappear with it.

use crate::config::{AudioFormat, PodcastConfig};
use crate::error::PodcastError;
use crate::job::ConversionJob;
use crate::pipeline::probe;
use crate::pipeline::synth::AudioClip;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Keep muxer stderr excerpts readable in error messages.
const MAX_STDERR_BYTES: usize = 2000;

/// Merge `clips` into a single artifact and return its bytes.
///
/// Clips are sorted and validated first: the sequence must be dense from 0
/// — a hole means a segment produced no clip, which is a fatal pipeline
/// error, never something to paper over.
pub async fn assemble(
    job: &ConversionJob,
    clips: &mut Vec<AudioClip>,
    config: &PodcastConfig,
) -> Result<Vec<u8>, PodcastError> {
    order_and_validate(clips)?;

    // ── Write clips + concat list into the job workspace ─────────────────
    let mut list = String::new();
    for clip in clips.iter() {
        let path = job.clip_path(clip.sequence_index, clip.format);
        tokio::fs::write(&path, &clip.bytes)
            .await
            .map_err(|e| PodcastError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
        list.push_str(&concat_entry(&path));
    }
    let list_path = job.workdir().join("clips.txt");
    tokio::fs::write(&list_path, &list)
        .await
        .map_err(|e| PodcastError::OutputWriteFailed {
            path: list_path.clone(),
            source: e,
        })?;

    // ── Run the muxer once over the full list ────────────────────────────
    let out_path = job.artifact_path(config.format);
    let uniform = clips.iter().all(|c| c.format == config.format);
    if !uniform {
        info!(
            "clip formats differ from target {:?}; normalising via re-encode",
            config.format
        );
    }

    let mut cmd = Command::new(&config.mux_program);
    cmd.arg("-hide_banner")
        .args(["-loglevel", "error"])
        .args(["-f", "concat", "-safe", "0"])
        .arg("-i")
        .arg(&list_path);
    for arg in codec_args(uniform, config.format) {
        cmd.arg(arg);
    }
    cmd.arg("-y")
        .arg(&out_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(
        "invoking muxer: {} ({} clips, copy={})",
        config.mux_program,
        clips.len(),
        uniform
    );

    let timeout = Duration::from_secs(config.mux_timeout_secs);
    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Err(_) => {
            // kill_on_drop terminated the child when the future was dropped.
            remove_partial(&out_path).await;
            return Err(PodcastError::MuxerTimeout {
                program: config.mux_program.clone(),
                secs: config.mux_timeout_secs,
            });
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PodcastError::MuxerNotFound {
                program: config.mux_program.clone(),
            });
        }
        Ok(Err(e)) => {
            remove_partial(&out_path).await;
            return Err(PodcastError::Internal(format!("failed to run muxer: {e}")));
        }
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        remove_partial(&out_path).await;
        return Err(PodcastError::MuxerFailed {
            program: config.mux_program.clone(),
            code: output.status.code(),
            stderr: stderr_excerpt(&output.stderr),
        });
    }

    let audio = match tokio::fs::read(&out_path).await {
        Ok(bytes) if !bytes.is_empty() => bytes,
        _ => {
            remove_partial(&out_path).await;
            return Err(PodcastError::MuxerFailed {
                program: config.mux_program.clone(),
                code: output.status.code(),
                stderr: "muxer exited successfully but produced no output".to_string(),
            });
        }
    };

    check_duration(&audio, clips);

    info!(
        "assembled {} clips into {} bytes",
        clips.len(),
        audio.len()
    );
    Ok(audio)
}

/// Sort by sequence index and require the sequence to be dense from 0.
fn order_and_validate(clips: &mut Vec<AudioClip>) -> Result<(), PodcastError> {
    if clips.is_empty() {
        return Err(PodcastError::Internal(
            "assembler invoked with zero clips".to_string(),
        ));
    }
    clips.sort_by_key(|c| c.sequence_index);
    for (expected, clip) in clips.iter().enumerate() {
        if clip.sequence_index != expected {
            return Err(PodcastError::ClipSequenceGap {
                expected,
                found: clip.sequence_index,
            });
        }
    }
    Ok(())
}

/// One line of the concat-demuxer list file. Single quotes inside the path
/// are escaped the way the demuxer expects (`'` → `'\''`).
fn concat_entry(path: &Path) -> String {
    let escaped = path.display().to_string().replace('\'', "'\\''");
    format!("file '{escaped}'\n")
}

/// Codec arguments: stream-copy when nothing needs transcoding, otherwise
/// a single re-encode to the target format.
fn codec_args(uniform: bool, format: AudioFormat) -> &'static [&'static str] {
    if uniform {
        return &["-c", "copy"];
    }
    match format {
        AudioFormat::Mp3 => &["-c:a", "libmp3lame", "-q:a", "4"],
        AudioFormat::Wav => &["-c:a", "pcm_s16le"],
    }
}

/// Compare the merged artifact's probed duration against the clip sum and
/// warn on a gap beyond encoder-framing tolerance. Advisory only: VBR
/// streams probe imprecisely, so this never fails the job.
fn check_duration(audio: &[u8], clips: &[AudioClip]) {
    let expected: Duration = clips.iter().map(|c| c.duration).sum();
    if expected.is_zero() {
        return;
    }
    let Some(actual) = probe::probe_duration(audio) else {
        return;
    };
    let tolerance = Duration::from_millis(500).max(expected.mul_f64(0.02));
    let gap = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    if gap > tolerance {
        warn!(
            "merged duration {:?} deviates from clip sum {:?} by {:?}",
            actual, expected, gap
        );
    } else {
        debug!("merged duration {:?} ≈ clip sum {:?}", actual, expected);
    }
}

async fn remove_partial(path: &Path) {
    if tokio::fs::remove_file(path).await.is_ok() {
        debug!("removed partial artifact {}", path.display());
    }
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let s = String::from_utf8_lossy(stderr);
    let s = s.trim();
    if s.len() <= MAX_STDERR_BYTES {
        s.to_string()
    } else {
        let mut end = MAX_STDERR_BYTES;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
