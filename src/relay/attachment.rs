//! Incoming media as the relay sees it, independent of the chat platform.

use std::fmt;
use std::path::Path;

/// A file attached to an incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingAttachment {
    /// Platform-assigned identifier used to fetch the file
    pub file_id: String,
    /// File name declared by the sender, if any
    pub file_name: Option<String>,
    /// MIME type declared by the sender, if any
    pub mime_type: Option<String>,
    /// Size declared by the platform, in bytes
    pub size: u64,
}

impl IncomingAttachment {
    /// Media kind of this attachment, or `None` if the relay does not handle it.
    ///
    /// The file extension wins over the MIME type: senders often upload
    /// audio as `application/octet-stream`.
    #[must_use]
    pub fn kind(&self) -> Option<MediaKind> {
        let by_extension = self
            .file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .and_then(|ext| match ext.as_str() {
                "mp3" => Some(MediaKind::Mp3),
                "mp4" => Some(MediaKind::Mp4),
                _ => None,
            });

        by_extension.or_else(|| {
            let mime = self.mime_type.as_deref()?.to_ascii_lowercase();
            if mime.contains("audio/mpeg") {
                Some(MediaKind::Mp3)
            } else if mime.contains("video/mp4") {
                Some(MediaKind::Mp4)
            } else {
                None
            }
        })
    }
}

/// Media the relay knows how to convert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// MPEG audio, relayed as a voice message
    Mp3,
    /// MPEG-4 video, relayed as a video note
    Mp4,
}

impl MediaKind {
    /// Extension used for the downloaded input file
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Mp4 => "mp4",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
