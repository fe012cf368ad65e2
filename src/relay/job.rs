//! Per-message scratch space.
//!
//! Every conversion gets its own directory under the configured work dir.
//! The directory is removed when the [`JobWorkspace`] guard is dropped, so
//! downloaded and encoded files never outlive the handler invocation, no
//! matter which step failed.

use super::attachment::MediaKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Output format a job converts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetProfile {
    /// Opus audio in an Ogg container
    Voice,
    /// Square H.264/AAC MP4
    VideoNote,
}

impl TargetProfile {
    const fn output_file_name(self) -> &'static str {
        match self {
            Self::Voice => "voice.ogg",
            Self::VideoNote => "video_note.mp4",
        }
    }
}

impl From<MediaKind> for TargetProfile {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Mp3 => Self::Voice,
            MediaKind::Mp4 => Self::VideoNote,
        }
    }
}

/// Scratch directory owned by a single job, deleted on drop
#[derive(Debug)]
pub struct JobWorkspace {
    root: PathBuf,
}

impl JobWorkspace {
    /// Create a fresh, uniquely named directory under `parent`
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub async fn create(parent: &Path) -> std::io::Result<Self> {
        let root = parent.join(format!("media-relay-{}", Uuid::new_v4().as_simple()));
        tokio::fs::create_dir_all(&root).await?;
        debug!(path = %root.display(), "Created job workspace");
        Ok(Self { root })
    }

    /// Directory holding this job's files
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => debug!(path = %self.root.display(), "Removed job workspace"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.root.display(),
                error = %e,
                "Failed to remove job workspace"
            ),
        }
    }
}

/// Input and output paths of one conversion, plus the workspace that owns them
#[derive(Debug)]
pub struct ConversionJob {
    workspace: JobWorkspace,
    input: PathBuf,
    output: PathBuf,
    profile: TargetProfile,
}

impl ConversionJob {
    /// Prepare a job for `kind` inside a new workspace under `work_dir`
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the workspace cannot be created.
    pub async fn new(work_dir: &Path, kind: MediaKind) -> std::io::Result<Self> {
        let workspace = JobWorkspace::create(work_dir).await?;
        let profile = TargetProfile::from(kind);
        let input = workspace
            .root()
            .join(format!("input.{}", kind.extension()));
        let output = workspace.root().join(profile.output_file_name());
        Ok(Self {
            workspace,
            input,
            output,
            profile,
        })
    }

    /// Where the downloaded attachment goes
    #[must_use]
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Where the codec writes its result
    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }

    #[must_use]
    pub const fn profile(&self) -> TargetProfile {
        self.profile
    }

    #[cfg(test)]
    fn workspace(&self) -> &Path {
        self.workspace.root()
    }
}
