use super::attachment::IncomingAttachment;
use super::job::TargetProfile;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

/// How a converted file ended up being delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Voice,
    VideoNote,
    /// Fallback when the encoded note is over the size limit
    Video,
}

/// Chat-side operations the relay needs, bound to one incoming message.
///
/// Replies are expected to be threaded to that message.
#[async_trait]
pub trait ReplyTransport: Send + Sync {
    /// Fetch the attachment's content into `dest`
    async fn download(&self, attachment: &IncomingAttachment, dest: &Path) -> Result<()>;

    async fn send_text(&self, text: &str) -> Result<()>;

    async fn send_voice(&self, path: &Path) -> Result<()>;

    /// `side` is the video note's width and height in pixels
    async fn send_video_note(&self, path: &Path, side: u32, duration_secs: Option<u32>)
        -> Result<()>;

    async fn send_video(&self, path: &Path) -> Result<()>;

    /// Show a "recording…" indicator while a conversion runs
    async fn notify_working(&self, profile: TargetProfile) -> Result<()>;
}
