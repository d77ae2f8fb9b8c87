//! Job lifecycle: state machine and scoped temporary resources.
//!
//! A [`ConversionJob`] binds one document to one output artifact. It owns
//! everything with a lifetime: the per-job temp directory the clips and the
//! concat list are written into, and the cancellation token the synthesis
//! tasks observe.
//!
//! ## Why a `TempDir`?
//!
//! The external muxer needs real files on disk, so intermediate clips cannot
//! stay purely in memory. Holding them in a `tempfile::TempDir` owned by the
//! job means every exit path — success, any component's failure, panic —
//! releases them when the job is dropped. No cleanup code runs in error
//! branches; ownership does the work. Directories are created fresh per job,
//! so concurrent jobs never share or collide on clip paths.

use crate::config::AudioFormat;
use crate::error::PodcastError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lifecycle state of a conversion job.
///
/// Transitions are one-directional along
/// `Created → Segmenting → Synthesizing → Assembling → Completed`, with
/// `Failed` reachable from every non-terminal state. No state is ever
/// re-entered; [`ConversionJob::advance`] enforces this at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Segmenting,
    Synthesizing,
    Assembling,
    Completed,
    Failed,
}

impl JobState {
    /// Whether the job can make no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    fn next(&self) -> Option<JobState> {
        match self {
            JobState::Created => Some(JobState::Segmenting),
            JobState::Segmenting => Some(JobState::Synthesizing),
            JobState::Synthesizing => Some(JobState::Assembling),
            JobState::Assembling => Some(JobState::Completed),
            JobState::Completed | JobState::Failed => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Created => "created",
            JobState::Segmenting => "segmenting",
            JobState::Synthesizing => "synthesizing",
            JobState::Assembling => "assembling",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One conversion run: state, temp workspace, cancellation.
///
/// Dropping the job deletes the workspace and everything in it.
pub struct ConversionJob {
    state: JobState,
    workdir: TempDir,
    cancel: CancellationToken,
}

impl ConversionJob {
    /// Create a job in the `Created` state with a fresh workspace.
    ///
    /// `parent` is the caller's cancellation token; the job derives a child
    /// token from it so the orchestrator can also cancel internally (on the
    /// first failed segment) without affecting the caller's token.
    pub fn new(parent: Option<&CancellationToken>) -> Result<Self, PodcastError> {
        let workdir = TempDir::with_prefix("notecast-job-")
            .map_err(|e| PodcastError::Internal(format!("failed to create job workspace: {e}")))?;
        let cancel = parent
            .map(|t| t.child_token())
            .unwrap_or_default();
        debug!("job workspace: {}", workdir.path().display());
        Ok(Self {
            state: JobState::Created,
            workdir,
            cancel,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// The job's cancellation token, observed by all synthesis tasks.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Directory scoped to this job for intermediate files.
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Path for the clip of segment `index` inside the workspace.
    pub fn clip_path(&self, index: usize, format: AudioFormat) -> PathBuf {
        self.workdir
            .path()
            .join(format!("segment_{index:03}.{}", format.extension()))
    }

    /// Path for the merged artifact inside the workspace.
    pub fn artifact_path(&self, format: AudioFormat) -> PathBuf {
        self.workdir
            .path()
            .join(format!("podcast.{}", format.extension()))
    }

    /// Advance to the next pipeline state.
    ///
    /// Returns an error if the job is already terminal — that would mean a
    /// component kept running after the job was decided, which is a bug.
    pub fn advance(&mut self) -> Result<JobState, PodcastError> {
        match self.state.next() {
            Some(next) => {
                debug!("job state: {} -> {}", self.state, next);
                self.state = next;
                Ok(next)
            }
            None => Err(PodcastError::Internal(format!(
                "attempted to advance job out of terminal state {}",
                self.state
            ))),
        }
    }

    /// Move the job into `Failed` and cancel any in-flight work.
    ///
    /// Idempotent from any non-`Completed` state; temp resources are
    /// released when the job is dropped.
    pub fn fail(&mut self) {
        if self.state != JobState::Completed {
            debug!("job state: {} -> failed", self.state);
            self.state = JobState::Failed;
            self.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for ConversionJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionJob")
            .field("state", &self.state)
            .field("workdir", &self.workdir.path())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_advance_in_order() {
        let mut job = ConversionJob::new(None).unwrap();
        assert_eq!(job.state(), JobState::Created);
        assert_eq!(job.advance().unwrap(), JobState::Segmenting);
        assert_eq!(job.advance().unwrap(), JobState::Synthesizing);
        assert_eq!(job.advance().unwrap(), JobState::Assembling);
        assert_eq!(job.advance().unwrap(), JobState::Completed);
        assert!(job.state().is_terminal());
        assert!(job.advance().is_err());
    }

    #[test]
    fn fail_is_reachable_from_any_nonterminal_state() {
        for advances in 0..4 {
            let mut job = ConversionJob::new(None).unwrap();
            for _ in 0..advances {
                job.advance().unwrap();
            }
            job.fail();
            assert_eq!(job.state(), JobState::Failed);
            assert!(job.cancel_token().is_cancelled());
            // Failed is terminal: no further transitions.
            assert!(job.advance().is_err());
        }
    }

    #[test]
    fn workspace_removed_on_drop() {
        let path;
        {
            let job = ConversionJob::new(None).unwrap();
            path = job.workdir().to_path_buf();
            std::fs::write(job.clip_path(0, AudioFormat::Mp3), b"data").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists(), "workspace should be deleted with the job");
    }

    #[test]
    fn clip_paths_are_ordered_and_namespaced() {
        let job = ConversionJob::new(None).unwrap();
        let p0 = job.clip_path(0, AudioFormat::Wav);
        let p12 = job.clip_path(12, AudioFormat::Wav);
        assert!(p0.starts_with(job.workdir()));
        assert!(p0.file_name().unwrap().to_str().unwrap() < p12.file_name().unwrap().to_str().unwrap());
        assert_eq!(p12.file_name().unwrap(), "segment_012.wav");
    }

    #[test]
    fn child_token_follows_parent_cancellation() {
        let parent = CancellationToken::new();
        let job = ConversionJob::new(Some(&parent)).unwrap();
        assert!(!job.cancel_token().is_cancelled());
        parent.cancel();
        assert!(job.cancel_token().is_cancelled());
    }
}
