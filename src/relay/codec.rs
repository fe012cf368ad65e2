//! External codec tool boundary.
//!
//! Probing goes through `ffprobe`, encoding through `ffmpeg`. Both are run as
//! child processes with piped output; a non-zero exit status is reported
//! together with the tail of stderr.

use super::error::ConversionError;
use crate::config::{Settings, VOICE_SAMPLE_RATE};
use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Keep log lines readable when ffmpeg dumps a wall of errors
const MAX_STDERR_CHARS: usize = 1_000;

/// Aspect ratios in this range are cropped to square instead of padded
const SQUARE_TOLERANCE: std::ops::RangeInclusive<f64> = 0.9..=1.1;

/// Properties of a media file as reported by the probe tool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
}

impl MediaInfo {
    /// Parse the JSON printed by `ffprobe -print_format json -show_format -show_streams`
    ///
    /// # Errors
    ///
    /// Returns `ConversionError::Probe` if the output is not valid probe JSON.
    pub fn from_ffprobe_json(json: &str) -> Result<Self, ConversionError> {
        let probe: ProbeOutput = serde_json::from_str(json)
            .map_err(|e| ConversionError::Probe(format!("invalid ffprobe output: {e}")))?;

        let video = probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));
        let audio = probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("audio"));

        // Container duration first; some muxers only fill it per stream
        let duration_secs = probe
            .format
            .as_ref()
            .and_then(|f| parse_seconds(f.duration.as_deref()))
            .or_else(|| {
                probe
                    .streams
                    .iter()
                    .filter_map(|s| parse_seconds(s.duration.as_deref()))
                    .reduce(f64::max)
            });

        Ok(Self {
            duration_secs,
            width: video.and_then(|v| v.width),
            height: video.and_then(|v| v.height),
            video_codec: video.and_then(|v| v.codec_name.clone()),
            audio_codec: audio.and_then(|a| a.codec_name.clone()),
        })
    }

    /// Width / height of the video stream, if known
    #[must_use]
    pub fn aspect_ratio(&self) -> Option<f64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if h > 0 => Some(f64::from(w) / f64::from(h)),
            _ => None,
        }
    }

    /// Whether the frame is close enough to square for a video note.
    /// Unknown dimensions count as square.
    #[must_use]
    pub fn is_square(&self) -> bool {
        self.aspect_ratio()
            .is_none_or(|ratio| SQUARE_TOLERANCE.contains(&ratio))
    }

    #[must_use]
    pub fn has_video(&self) -> bool {
        self.video_codec.is_some()
    }
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
}

/// Media conversion backend used by the relay handlers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Codec: Send + Sync {
    /// Read duration, dimensions and codecs of `input`
    async fn probe(&self, input: &Path) -> Result<MediaInfo, ConversionError>;

    /// Encode `input` as an Opus voice message at `output`
    async fn encode_voice(&self, input: &Path, output: &Path) -> Result<(), ConversionError>;

    /// Encode `input` as a square video note at `output`
    async fn encode_video_note(
        &self,
        input: &Path,
        output: &Path,
        info: &MediaInfo,
    ) -> Result<(), ConversionError>;
}

/// [`Codec`] backed by the `ffmpeg` and `ffprobe` command-line tools
#[derive(Debug, Clone)]
pub struct FfmpegCodec {
    ffmpeg: String,
    ffprobe: String,
    voice_channels: u8,
    voice_bitrate: String,
    note_side: u32,
    max_duration_secs: f64,
}

impl FfmpegCodec {
    /// Build a codec from the loaded settings
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            ffmpeg: settings.ffmpeg_path.clone(),
            ffprobe: settings.ffprobe_path.clone(),
            voice_channels: settings.voice_channels,
            voice_bitrate: settings.voice_bitrate.clone(),
            note_side: settings.note_side(),
            max_duration_secs: settings.max_video_duration_secs,
        }
    }

    fn voice_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let sample_rate = VOICE_SAMPLE_RATE.to_string();
        let channels = self.voice_channels.to_string();
        let mut args = base_args(input);
        args.extend(
            [
                "-vn",
                "-map_metadata",
                "-1",
                "-c:a",
                "libopus",
                "-b:a",
                self.voice_bitrate.as_str(),
                "-ar",
                sample_rate.as_str(),
                "-ac",
                channels.as_str(),
                "-application",
                "voip",
                "-f",
                "ogg",
            ]
            .map(OsString::from),
        );
        args.push(output.as_os_str().to_owned());
        args
    }

    fn video_note_args(&self, input: &Path, output: &Path, info: &MediaInfo) -> Vec<OsString> {
        let filter = self.video_note_filter(info);
        let max_duration = format!("{:.3}", self.max_duration_secs);
        let mut args = base_args(input);
        args.extend(
            [
                "-vf",
                filter.as_str(),
                "-t",
                max_duration.as_str(),
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-crf",
                "26",
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-b:a",
                "96k",
                "-movflags",
                "+faststart",
                "-f",
                "mp4",
            ]
            .map(OsString::from),
        );
        args.push(output.as_os_str().to_owned());
        args
    }

    /// Square the frame (crop near-square, pad the rest) and scale to the note side
    fn video_note_filter(&self, info: &MediaInfo) -> String {
        let side = self.note_side;
        let scale = format!("scale={side}:{side},setsar=1");
        let (Some(w), Some(h)) = (info.width, info.height) else {
            return scale;
        };
        if info.is_square() {
            let m = w.min(h);
            format!("crop={m}:{m},{scale}")
        } else {
            let m = w.max(h);
            format!("pad={m}:{m}:(ow-iw)/2:(oh-ih)/2:color=black,{scale}")
        }
    }

    async fn run(tool: &str, args: &[OsString]) -> Result<std::process::Output, ConversionError> {
        debug!(tool = %tool, args = ?args, "Running codec tool");

        let output = Command::new(tool)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ConversionError::Spawn {
                tool: tool.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ConversionError::Failed {
                tool: tool.to_string(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(output)
    }
}

fn base_args(input: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error", "-i"]
        .map(OsString::from)
        .to_vec();
    args.push(input.as_os_str().to_owned());
    args
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= MAX_STDERR_CHARS {
        return text.to_string();
    }
    text.chars().skip(count - MAX_STDERR_CHARS).collect()
}

/// The codec may exit 0 and still write nothing (e.g. no audio stream selected)
async fn ensure_output(output: &Path) -> Result<(), ConversionError> {
    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(ConversionError::MissingOutput(output.to_path_buf())),
    }
}

#[async_trait]
impl Codec for FfmpegCodec {
    async fn probe(&self, input: &Path) -> Result<MediaInfo, ConversionError> {
        let args: Vec<OsString> = [
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]
        .map(OsString::from)
        .into_iter()
        .chain(std::iter::once(input.as_os_str().to_owned()))
        .collect();

        let output = Self::run(&self.ffprobe, &args).await?;
        MediaInfo::from_ffprobe_json(&String::from_utf8_lossy(&output.stdout))
    }

    async fn encode_voice(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        Self::run(&self.ffmpeg, &self.voice_args(input, output)).await?;
        ensure_output(output).await?;
        info!(output = %output.display(), "Encoded voice message");
        Ok(())
    }

    async fn encode_video_note(
        &self,
        input: &Path,
        output: &Path,
        info: &MediaInfo,
    ) -> Result<(), ConversionError> {
        Self::run(&self.ffmpeg, &self.video_note_args(input, output, info)).await?;
        ensure_output(output).await?;
        info!(output = %output.display(), "Encoded video note");
        Ok(())
    }
}
