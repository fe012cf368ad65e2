//! Per-format conversion handlers.
//!
//! Each handler receives a job whose input file is already downloaded and
//! runs the rest of the pipeline: validate → convert → upload. Cleanup is
//! owned by the job itself.

use super::codec::Codec;
use super::error::{ConversionError, RelayError, ValidationError};
use super::job::ConversionJob;
use super::transport::{Delivery, ReplyTransport};
use super::{NOTE_TOO_LARGE_TEXT, NOT_SQUARE_TEXT};
use crate::config::Settings;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Platform limits a video must satisfy to become a video note
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaLimits {
    pub max_duration_secs: f64,
    pub max_size_bytes: u64,
}

impl MediaLimits {
    #[must_use]
    pub const fn from_settings(settings: &Settings) -> Self {
        Self {
            max_duration_secs: settings.max_video_duration_secs,
            max_size_bytes: settings.max_video_size_bytes,
        }
    }

    /// # Errors
    ///
    /// Returns `ValidationError::TooLarge` if `size_bytes` exceeds the limit.
    pub const fn check_size(&self, size_bytes: u64) -> Result<(), ValidationError> {
        if size_bytes > self.max_size_bytes {
            return Err(ValidationError::TooLarge {
                size_bytes,
                max_bytes: self.max_size_bytes,
            });
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ValidationError::TooLong` if `duration_secs` exceeds the limit.
    pub fn check_duration(&self, duration_secs: f64) -> Result<(), ValidationError> {
        if duration_secs > self.max_duration_secs {
            return Err(ValidationError::TooLong {
                duration_secs,
                max_secs: self.max_duration_secs,
            });
        }
        Ok(())
    }
}

async fn file_size(path: &Path) -> Result<u64, RelayError> {
    Ok(tokio::fs::metadata(path).await?.len())
}

fn upload_error(e: &anyhow::Error) -> RelayError {
    RelayError::Upload(format!("{e:#}"))
}

/// MP3 → voice message
pub struct VoiceHandler {
    codec: Arc<dyn Codec>,
}

impl VoiceHandler {
    #[must_use]
    pub fn new(codec: Arc<dyn Codec>) -> Self {
        Self { codec }
    }

    /// Encode the downloaded audio as Opus and reply with it as a voice message.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Conversion` if encoding fails and
    /// `RelayError::Upload` if the reply cannot be sent.
    pub async fn run(
        &self,
        job: &ConversionJob,
        transport: &dyn ReplyTransport,
    ) -> Result<Delivery, RelayError> {
        if let Err(e) = transport.notify_working(job.profile()).await {
            debug!(error = %e, "Failed to send chat action");
        }

        self.codec.encode_voice(job.input(), job.output()).await?;

        transport
            .send_voice(job.output())
            .await
            .map_err(|e| upload_error(&e))?;
        Ok(Delivery::Voice)
    }
}

/// MP4 → round video note
pub struct VideoNoteHandler {
    codec: Arc<dyn Codec>,
    limits: MediaLimits,
    note_side: u32,
}

impl VideoNoteHandler {
    #[must_use]
    pub fn new(codec: Arc<dyn Codec>, limits: MediaLimits, note_side: u32) -> Self {
        Self {
            codec,
            limits,
            note_side,
        }
    }

    #[must_use]
    pub const fn limits(&self) -> MediaLimits {
        self.limits
    }

    /// Cheap rejection based on the size the platform declared, before any download
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::TooLarge` if the declared size is over the limit.
    pub const fn check_declared_size(&self, size_bytes: u64) -> Result<(), ValidationError> {
        self.limits.check_size(size_bytes)
    }

    /// Validate the downloaded video, convert it and reply with a video note.
    ///
    /// The codec is not asked to encode anything unless the file is within
    /// both the size and the duration limit.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Validation` for out-of-bounds input,
    /// `RelayError::Conversion` if probing or encoding fails and
    /// `RelayError::Upload` if the reply cannot be sent.
    pub async fn run(
        &self,
        job: &ConversionJob,
        transport: &dyn ReplyTransport,
    ) -> Result<Delivery, RelayError> {
        self.limits.check_size(file_size(job.input()).await?)?;

        let info = self.codec.probe(job.input()).await?;
        if !info.has_video() {
            return Err(ConversionError::Probe("no video stream".into()).into());
        }
        let duration = info
            .duration_secs
            .ok_or_else(|| ConversionError::Probe("duration unavailable".into()))?;
        info!(
            duration_secs = duration,
            width = ?info.width,
            height = ?info.height,
            "Video info"
        );
        self.limits.check_duration(duration)?;

        if !info.is_square() {
            info!(aspect_ratio = ?info.aspect_ratio(), "Video is not square, padding");
            if let Err(e) = transport.send_text(NOT_SQUARE_TEXT).await {
                warn!(error = %e, "Failed to send non-square notice");
            }
        }
        if let Err(e) = transport.notify_working(job.profile()).await {
            debug!(error = %e, "Failed to send chat action");
        }

        self.codec
            .encode_video_note(job.input(), job.output(), &info)
            .await?;

        let encoded_size = file_size(job.output()).await?;
        if self.limits.check_size(encoded_size).is_err() {
            warn!(
                encoded_size,
                max = self.limits.max_size_bytes,
                "Encoded video note over size limit, sending as regular video"
            );
            if let Err(e) = transport.send_text(NOTE_TOO_LARGE_TEXT).await {
                warn!(error = %e, "Failed to send oversize notice");
            }
            transport
                .send_video(job.output())
                .await
                .map_err(|e| upload_error(&e))?;
            return Ok(Delivery::Video);
        }

        let duration_secs = duration.ceil() as u32;
        transport
            .send_video_note(job.output(), self.note_side, Some(duration_secs))
            .await
            .map_err(|e| upload_error(&e))?;
        Ok(Delivery::VideoNote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: MediaLimits = MediaLimits {
        max_duration_secs: 60.0,
        max_size_bytes: 20 * 1024 * 1024,
    };

    #[test]
    fn test_size_limit_is_inclusive() {
        assert!(LIMITS.check_size(20 * 1024 * 1024).is_ok());
        assert!(matches!(
            LIMITS.check_size(20 * 1024 * 1024 + 1),
            Err(ValidationError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_duration_limit_is_inclusive() {
        assert!(LIMITS.check_duration(60.0).is_ok());
        assert!(LIMITS.check_duration(0.5).is_ok());
        assert!(matches!(
            LIMITS.check_duration(61.0),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_limits_from_settings() {
        let mut settings = crate::config::test_settings();
        settings.max_video_duration_secs = 30.0;
        settings.max_video_size_bytes = 1024;

        let limits = MediaLimits::from_settings(&settings);
        assert!(limits.check_duration(31.0).is_err());
        assert!(limits.check_size(1025).is_err());
    }
}
