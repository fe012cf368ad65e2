//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the platform limits for converted media.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Telegram caps video notes at one minute
pub const DEFAULT_MAX_VIDEO_DURATION_SECS: f64 = 60.0;
/// Bot API download/upload ceiling for video notes (20 MB)
pub const DEFAULT_MAX_VIDEO_SIZE_BYTES: u64 = 20 * 1024 * 1024;
/// Largest side Telegram renders for a video note
pub const DEFAULT_VIDEO_NOTE_SIDE: u32 = 640;
/// Voice messages are mono unless configured otherwise
pub const DEFAULT_VOICE_CHANNELS: u8 = 1;
/// Opus bitrate for voice messages
pub const DEFAULT_VOICE_BITRATE: &str = "64k";
/// Opus only accepts a handful of rates; 48 kHz is the native one
pub const VOICE_SAMPLE_RATE: u32 = 48_000;

// Unauthorized access flood protection
/// Cooldown (seconds) between "Access denied" replies to the same user.
/// Default: 20 minutes.
pub const UNAUTHORIZED_COOLDOWN_SECS: u64 = 1200;
/// Time-to-live (seconds) for cache entries.
/// Default: 2 hours.
pub const UNAUTHORIZED_CACHE_TTL_SECS: u64 = 7200;
/// Maximum cache capacity (number of entries).
pub const UNAUTHORIZED_CACHE_MAX_SIZE: u64 = 10_000;

/// Application settings loaded from config files and environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Comma-separated list of allowed user IDs; empty means everyone
    #[serde(rename = "allowed_users")]
    pub allowed_users_str: Option<String>,

    /// Longest video (seconds) accepted for a video note
    #[serde(default = "default_max_video_duration_secs")]
    pub max_video_duration_secs: f64,
    /// Largest video (bytes) accepted for a video note
    #[serde(default = "default_max_video_size_bytes")]
    pub max_video_size_bytes: u64,

    /// Path or name of the ffmpeg binary
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    /// Path or name of the ffprobe binary
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    /// Parent directory for per-job scratch directories
    pub work_dir: Option<PathBuf>,

    /// Output side length of video notes in pixels
    #[serde(default = "default_video_note_side")]
    pub video_note_side: u32,
    /// Channel count of voice messages (1 or 2)
    #[serde(default = "default_voice_channels")]
    pub voice_channels: u8,
    /// Opus bitrate of voice messages, in ffmpeg notation
    #[serde(default = "default_voice_bitrate")]
    pub voice_bitrate: String,

    /// Optional log file written in addition to stderr
    pub log_file: Option<PathBuf>,
}

const fn default_max_video_duration_secs() -> f64 {
    DEFAULT_MAX_VIDEO_DURATION_SECS
}

const fn default_max_video_size_bytes() -> u64 {
    DEFAULT_MAX_VIDEO_SIZE_BYTES
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

const fn default_video_note_side() -> u32 {
    DEFAULT_VIDEO_NOTE_SIDE
}

const fn default_voice_channels() -> u8 {
    DEFAULT_VOICE_CHANNELS
}

fn default_voice_bitrate() -> String {
    DEFAULT_VOICE_BITRATE.to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_relay_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a value is out of range.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Eg. `APP_MAX_VIDEO_SIZE_BYTES=1000 ./target/app`
            .add_source(Environment::with_prefix("APP").separator("__"))
            // UPPER_SNAKE_CASE env vars map onto snake_case keys; empty ones count as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let settings: Self = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram_token.trim().is_empty() {
            return Err(ConfigError::Message("telegram_token is empty".into()));
        }
        if self.max_video_duration_secs.is_nan() || self.max_video_duration_secs <= 0.0 {
            return Err(ConfigError::Message(
                "max_video_duration_secs must be positive".into(),
            ));
        }
        if self.max_video_size_bytes == 0 {
            return Err(ConfigError::Message(
                "max_video_size_bytes must be positive".into(),
            ));
        }
        if !matches!(self.voice_channels, 1 | 2) {
            return Err(ConfigError::Message(format!(
                "voice_channels must be 1 or 2, got {}",
                self.voice_channels
            )));
        }
        if self.video_note_side < 2 || self.video_note_side > DEFAULT_VIDEO_NOTE_SIDE {
            return Err(ConfigError::Message(format!(
                "video_note_side must be within 2..={DEFAULT_VIDEO_NOTE_SIDE}"
            )));
        }
        Ok(())
    }

    /// Returns a set of Telegram IDs that are allowed to use the bot
    #[must_use]
    pub fn allowed_users(&self) -> HashSet<i64> {
        self.allowed_users_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `user_id` may use the bot. An empty allow-list admits everyone.
    #[must_use]
    pub fn is_user_allowed(&self, user_id: i64) -> bool {
        let allowed = self.allowed_users();
        allowed.is_empty() || allowed.contains(&user_id)
    }

    /// Side length actually encoded and announced for video notes.
    /// libx264 needs even dimensions, so odd values are rounded down.
    #[must_use]
    pub const fn note_side(&self) -> u32 {
        self.video_note_side & !1
    }

    /// Directory under which per-job scratch directories are created
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Get unauthorized cooldown from env or default.
///
/// Environment variable: `UNAUTHORIZED_COOLDOWN_SECS`.
#[must_use]
pub fn get_unauthorized_cooldown() -> u64 {
    std::env::var("UNAUTHORIZED_COOLDOWN_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(UNAUTHORIZED_COOLDOWN_SECS)
}

/// Get unauthorized cache TTL from env or default.
///
/// Environment variable: `UNAUTHORIZED_CACHE_TTL_SECS`.
#[must_use]
pub fn get_unauthorized_cache_ttl() -> u64 {
    std::env::var("UNAUTHORIZED_CACHE_TTL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(UNAUTHORIZED_CACHE_TTL_SECS)
}

/// Get unauthorized cache max size from env or default.
///
/// Environment variable: `UNAUTHORIZED_CACHE_MAX_SIZE`.
#[must_use]
pub fn get_unauthorized_cache_max_size() -> u64 {
    std::env::var("UNAUTHORIZED_CACHE_MAX_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(UNAUTHORIZED_CACHE_MAX_SIZE)
}

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings {
        telegram_token: "dummy".to_string(),
        allowed_users_str: None,
        max_video_duration_secs: DEFAULT_MAX_VIDEO_DURATION_SECS,
        max_video_size_bytes: DEFAULT_MAX_VIDEO_SIZE_BYTES,
        ffmpeg_path: default_ffmpeg_path(),
        ffprobe_path: default_ffprobe_path(),
        work_dir: None,
        video_note_side: DEFAULT_VIDEO_NOTE_SIDE,
        voice_channels: DEFAULT_VOICE_CHANNELS,
        voice_bitrate: default_voice_bitrate(),
        log_file: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Env vars are process-global, so all env-driven cases live in one test
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        // 1. Defaults apply when only the token is set
        env::set_var("TELEGRAM_TOKEN", "dummy_token");

        let settings = Settings::new()?;
        assert_eq!(settings.telegram_token, "dummy_token");
        assert!((settings.max_video_duration_secs - 60.0).abs() < f64::EPSILON);
        assert_eq!(settings.max_video_size_bytes, 20 * 1024 * 1024);
        assert_eq!(settings.ffmpeg_path, "ffmpeg");
        assert_eq!(settings.voice_channels, 1);

        // 2. Overrides from plain env vars
        env::set_var("MAX_VIDEO_SIZE_BYTES", "1048576");
        env::set_var("FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg");

        let settings = Settings::new()?;
        assert_eq!(settings.max_video_size_bytes, 1_048_576);
        assert_eq!(settings.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");

        env::remove_var("MAX_VIDEO_SIZE_BYTES");
        env::remove_var("FFMPEG_PATH");

        // 3. Out-of-range values are rejected
        env::set_var("VOICE_CHANNELS", "6");
        assert!(Settings::new().is_err());
        env::remove_var("VOICE_CHANNELS");

        env::remove_var("TELEGRAM_TOKEN");
        Ok(())
    }

    #[test]
    fn test_list_parsing() {
        let mut settings = test_settings();

        // Test comma
        settings.allowed_users_str = Some("123,456".to_string());
        let allowed = settings.allowed_users();
        assert!(allowed.contains(&123));
        assert!(allowed.contains(&456));
        assert_eq!(allowed.len(), 2);

        // Test semicolon and mixed
        settings.allowed_users_str = Some("333; 444, 555".to_string());
        let allowed = settings.allowed_users();
        assert_eq!(allowed.len(), 3);

        // Test empty/bad parsing
        settings.allowed_users_str = Some("abc, 777".to_string());
        let allowed = settings.allowed_users();
        assert!(allowed.contains(&777));
        assert_eq!(allowed.len(), 1);
    }

    #[test]
    fn test_empty_allow_list_admits_everyone() {
        let mut settings = test_settings();
        assert!(settings.is_user_allowed(42));

        settings.allowed_users_str = Some(String::new());
        assert!(settings.is_user_allowed(42));

        settings.allowed_users_str = Some("1, 2".to_string());
        assert!(settings.is_user_allowed(2));
        assert!(!settings.is_user_allowed(42));
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let mut settings = test_settings();
        assert!(settings.validate().is_ok());

        settings.max_video_duration_secs = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = test_settings();
        settings.video_note_side = 1024;
        assert!(settings.validate().is_err());

        settings.video_note_side = 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_note_side_is_even() {
        let mut settings = test_settings();
        assert_eq!(settings.note_side(), 640);

        settings.video_note_side = 639;
        assert_eq!(settings.note_side(), 638);

        settings.video_note_side = 2;
        assert_eq!(settings.note_side(), 2);
    }
}
