use super::attachment::MediaKind;
use std::path::PathBuf;
use thiserror::Error;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A media file is outside the limits Telegram puts on video notes.
///
/// `Display` is the text shown to the user.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("❌ Video file is too large. Video notes must be under {}MB.", mb(.max_bytes))]
    TooLarge { size_bytes: u64, max_bytes: u64 },

    #[error("❌ Video is too long. Video notes must be under {} seconds.", .max_secs.round())]
    TooLong { duration_secs: f64, max_secs: f64 },
}

fn mb(bytes: &u64) -> String {
    let value = *bytes as f64 / BYTES_PER_MB;
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

/// The external codec tool could not produce the requested output
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("codec produced no output at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("could not read media properties: {0}")]
    Probe(String),
}

/// Everything that can go wrong while relaying one attachment
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("download failed: {0}")]
    Download(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("job workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}

impl RelayError {
    /// Text sent back to the user when relaying `kind` failed with this error
    #[must_use]
    pub fn user_message(&self, kind: MediaKind) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            _ => match kind {
                MediaKind::Mp3 => "❌ Error processing the MP3 file. Please try again.".into(),
                MediaKind::Mp4 => "❌ Error processing the MP4 file. Please try again.".into(),
            },
        }
    }

    /// Short label for structured logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Download(_) => "download",
            Self::Validation(_) => "validation",
            Self::Conversion(_) => "conversion",
            Self::Upload(_) => "upload",
            Self::Workspace(_) => "workspace",
        }
    }
}
