//! Media relay: turns uploaded MP3/MP4 files into voice messages and video notes.
//!
//! [`MediaRelay::handle`] is the boundary for one incoming attachment. It
//! allocates a [`ConversionJob`], downloads into it, hands it to the handler
//! for the attachment's [`MediaKind`], and converts any failure into a single
//! user-facing reply. The job's scratch directory is removed when the job is
//! dropped, on every exit path.

pub mod attachment;
pub mod codec;
pub mod error;
pub mod handlers;
pub mod job;
pub mod transport;

pub use attachment::{IncomingAttachment, MediaKind};
pub use codec::{Codec, FfmpegCodec, MediaInfo};
pub use error::{ConversionError, RelayError, ValidationError};
pub use handlers::{MediaLimits, VideoNoteHandler, VoiceHandler};
pub use job::{ConversionJob, JobWorkspace, TargetProfile};
pub use transport::{Delivery, ReplyTransport};

use crate::config::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Reply for attachments the relay does not convert
pub const UNSUPPORTED_MEDIA_TEXT: &str = "📄 Please send .mp3 or .mp4 files only.";
/// Reply for messages without any attachment
pub const NO_MEDIA_TEXT: &str = "📄 Please send a media file (.mp3 or .mp4).";
/// Notice sent before padding a non-square video
pub const NOT_SQUARE_TEXT: &str =
    "⚠️ Video is not square. I'll pad it to square and send as a video note.";
/// Notice sent when the encoded note is too big and goes out as a regular video
pub const NOTE_TOO_LARGE_TEXT: &str =
    "⚠️ Converted video is still too large for a video note. Sending as regular video instead.";

/// Welcome / help text with the configured limits filled in
#[must_use]
pub fn usage_text(limits: &MediaLimits) -> String {
    format!(
        "🎵🎥 Send me media files to convert:\n\
         • .mp3 → Voice message\n\
         • .mp4 → Round video note ({}s max, {}MB max)",
        limits.max_duration_secs.round(),
        limits.max_size_bytes / (1024 * 1024)
    )
}

/// Entry point for converting one attachment
pub struct MediaRelay {
    work_dir: PathBuf,
    voice: VoiceHandler,
    video_note: VideoNoteHandler,
}

impl MediaRelay {
    /// Build a relay from settings, using `codec` for all conversions
    #[must_use]
    pub fn new(settings: &Settings, codec: Arc<dyn Codec>) -> Self {
        Self {
            work_dir: settings.work_dir(),
            voice: VoiceHandler::new(codec.clone()),
            video_note: VideoNoteHandler::new(
                codec,
                MediaLimits::from_settings(settings),
                settings.note_side(),
            ),
        }
    }

    /// Build a relay backed by the ffmpeg command-line tools
    #[must_use]
    pub fn with_ffmpeg(settings: &Settings) -> Self {
        Self::new(settings, Arc::new(FfmpegCodec::from_settings(settings)))
    }

    #[must_use]
    pub const fn limits(&self) -> MediaLimits {
        self.video_note.limits()
    }

    /// Run the full pipeline for an attachment of `kind` without replying on error.
    ///
    /// # Errors
    ///
    /// Returns the first [`RelayError`] hit by download, validation,
    /// conversion or upload. Temporary files are gone by the time this returns.
    pub async fn process(
        &self,
        kind: MediaKind,
        attachment: &IncomingAttachment,
        transport: &dyn ReplyTransport,
    ) -> Result<Delivery, RelayError> {
        if kind == MediaKind::Mp4 {
            self.video_note.check_declared_size(attachment.size)?;
        }

        let job = ConversionJob::new(&self.work_dir, kind).await?;

        transport
            .download(attachment, job.input())
            .await
            .map_err(|e| RelayError::Download(format!("{e:#}")))?;

        match kind {
            MediaKind::Mp3 => self.voice.run(&job, transport).await,
            MediaKind::Mp4 => self.video_note.run(&job, transport).await,
        }
    }

    /// Convert and deliver `attachment`, replying with a text message on any failure.
    ///
    /// Never fails: errors are logged and reported to the user. Returns how
    /// the result was delivered, or `None` if nothing was.
    pub async fn handle(
        &self,
        attachment: &IncomingAttachment,
        transport: &dyn ReplyTransport,
    ) -> Option<Delivery> {
        info!(
            file_id = %attachment.file_id,
            file_name = ?attachment.file_name,
            mime_type = ?attachment.mime_type,
            size = attachment.size,
            "Received media"
        );

        let Some(kind) = attachment.kind() else {
            info!(file_name = ?attachment.file_name, mime_type = ?attachment.mime_type, "Unsupported file type");
            if let Err(e) = transport.send_text(UNSUPPORTED_MEDIA_TEXT).await {
                warn!(error = %e, "Failed to send unsupported-type reply");
            }
            return None;
        };

        match self.process(kind, attachment, transport).await {
            Ok(delivery) => {
                info!(%kind, ?delivery, "Media relayed successfully");
                Some(delivery)
            }
            Err(e) => {
                if let RelayError::Validation(reason) = &e {
                    info!(%kind, %reason, "Rejected media");
                } else {
                    error!(%kind, error_kind = e.kind(), error = %e, "Error processing media");
                }
                if let Err(send_err) = transport.send_text(&e.user_message(kind)).await {
                    warn!(error = %send_err, "Failed to send error reply");
                }
                None
            }
        }
    }
}
