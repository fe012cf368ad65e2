//! Telegram bot that converts uploaded `.mp3` files into voice messages and
//! `.mp4` files into round video notes using `ffmpeg`.

/// Telegram transport and dispatch endpoints
pub mod bot;
/// Configuration and settings management
pub mod config;
/// Conversion pipeline, independent of Telegram
pub mod relay;
