//! Runs the real codec tools. Needs `ffmpeg` (with libmp3lame, libopus and
//! libx264) and `ffprobe` on PATH.

use anyhow::{ensure, Result};
use media_relay_bot::config::Settings;
use media_relay_bot::relay::{Codec, ConversionError, FfmpegCodec};
use std::path::Path;
use tokio::process::Command;

fn settings() -> Settings {
    Settings {
        telegram_token: "dummy".to_string(),
        allowed_users_str: None,
        max_video_duration_secs: 60.0,
        max_video_size_bytes: 20 * 1024 * 1024,
        ffmpeg_path: "ffmpeg".to_string(),
        ffprobe_path: "ffprobe".to_string(),
        work_dir: None,
        video_note_side: 320,
        voice_channels: 1,
        voice_bitrate: "32k".to_string(),
        log_file: None,
    }
}

async fn ffmpeg(args: &[&str]) -> Result<()> {
    let status = Command::new("ffmpeg")
        .args(["-y", "-hide_banner", "-loglevel", "error"])
        .args(args)
        .status()
        .await?;
    ensure!(status.success(), "ffmpeg {args:?} failed with {status}");
    Ok(())
}

async fn make_mp3(path: &Path, seconds: u32) -> Result<()> {
    let source = format!("sine=frequency=440:duration={seconds}");
    ffmpeg(&["-f", "lavfi", "-i", &source, "-c:a", "libmp3lame", &path.to_string_lossy()]).await
}

async fn make_mp4(path: &Path, seconds: u32, size: &str) -> Result<()> {
    let video = format!("testsrc=size={size}:rate=10:duration={seconds}");
    let audio = format!("sine=frequency=440:duration={seconds}");
    ffmpeg(&[
        "-f",
        "lavfi",
        "-i",
        &video,
        "-f",
        "lavfi",
        "-i",
        &audio,
        "-c:v",
        "libx264",
        "-preset",
        "ultrafast",
        "-c:a",
        "aac",
        "-shortest",
        &path.to_string_lossy(),
    ])
    .await
}

#[tokio::test]
#[ignore = "Requires ffmpeg and ffprobe on PATH"]
async fn mp3_becomes_opus_voice() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("in.mp3");
    let output = dir.path().join("voice.ogg");
    make_mp3(&input, 2).await?;

    let codec = FfmpegCodec::from_settings(&settings());
    codec.encode_voice(&input, &output).await?;

    let info = codec.probe(&output).await?;
    assert_eq!(info.audio_codec.as_deref(), Some("opus"));
    assert!(!info.has_video());
    Ok(())
}

#[tokio::test]
#[ignore = "Requires ffmpeg and ffprobe on PATH"]
async fn landscape_mp4_becomes_square_note() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("in.mp4");
    let output = dir.path().join("note.mp4");
    make_mp4(&input, 2, "320x180").await?;

    let codec = FfmpegCodec::from_settings(&settings());
    let info = codec.probe(&input).await?;
    assert!(!info.is_square());

    codec.encode_video_note(&input, &output, &info).await?;

    let note = codec.probe(&output).await?;
    assert_eq!(note.width, Some(320));
    assert_eq!(note.height, Some(320));
    assert_eq!(note.video_codec.as_deref(), Some("h264"));
    Ok(())
}

#[tokio::test]
#[ignore = "Requires ffmpeg and ffprobe on PATH"]
async fn probe_reports_61_seconds() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("long.mp4");
    make_mp4(&input, 61, "64x64").await?;

    let info = FfmpegCodec::from_settings(&settings()).probe(&input).await?;
    let duration = info.duration_secs.unwrap_or_default();
    assert!(duration > 60.0, "duration was {duration}");
    Ok(())
}

#[tokio::test]
#[ignore = "Requires ffmpeg and ffprobe on PATH"]
async fn garbage_input_fails_with_exit_status() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("in.mp3");
    let output = dir.path().join("voice.ogg");
    tokio::fs::write(&input, b"definitely not audio").await?;

    let err = FfmpegCodec::from_settings(&settings())
        .encode_voice(&input, &output)
        .await;
    assert!(matches!(err, Err(ConversionError::Failed { .. })));
    Ok(())
}
