//! Telegram implementation of [`ReplyTransport`].

use crate::relay::{IncomingAttachment, ReplyTransport, TargetProfile};
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ChatId, FileId, InputFile, MessageId, ReplyParameters};
use tokio::io::AsyncWriteExt;
use tracing::debug;

fn mime<M: ToString>(m: Option<&M>) -> Option<String> {
    m.map(ToString::to_string)
}

/// Extract the media attachment of a message, if it carries one.
///
/// Documents, audio, video and voice messages are all considered; users
/// send the same file through any of them depending on their client.
#[must_use]
pub fn attachment_from_message(msg: &Message) -> Option<IncomingAttachment> {
    if let Some(doc) = msg.document() {
        return Some(IncomingAttachment {
            file_id: doc.file.id.0.clone(),
            file_name: doc.file_name.clone(),
            mime_type: mime(doc.mime_type.as_ref()),
            size: u64::from(doc.file.size),
        });
    }
    if let Some(audio) = msg.audio() {
        return Some(IncomingAttachment {
            file_id: audio.file.id.0.clone(),
            file_name: audio.file_name.clone(),
            mime_type: mime(audio.mime_type.as_ref()),
            size: u64::from(audio.file.size),
        });
    }
    if let Some(video) = msg.video() {
        return Some(IncomingAttachment {
            file_id: video.file.id.0.clone(),
            file_name: video.file_name.clone(),
            mime_type: mime(video.mime_type.as_ref()),
            size: u64::from(video.file.size),
        });
    }
    msg.voice().map(|voice| IncomingAttachment {
        file_id: voice.file.id.0.clone(),
        file_name: None,
        mime_type: mime(voice.mime_type.as_ref()),
        size: u64::from(voice.file.size),
    })
}

/// Replies to a single incoming message
pub struct TelegramReplyTransport {
    bot: Bot,
    chat_id: ChatId,
    reply_to: MessageId,
}

impl TelegramReplyTransport {
    #[must_use]
    pub const fn new(bot: Bot, chat_id: ChatId, reply_to: MessageId) -> Self {
        Self {
            bot,
            chat_id,
            reply_to,
        }
    }

    /// Transport replying to `msg` in its own chat
    #[must_use]
    pub fn for_message(bot: Bot, msg: &Message) -> Self {
        Self::new(bot, msg.chat.id, msg.id)
    }

    fn reply_params(&self) -> ReplyParameters {
        ReplyParameters::new(self.reply_to).allow_sending_without_reply()
    }
}

#[async_trait]
impl ReplyTransport for TelegramReplyTransport {
    async fn download(&self, attachment: &IncomingAttachment, dest: &Path) -> Result<()> {
        let file = self
            .bot
            .get_file(FileId(attachment.file_id.clone()))
            .await?;
        let mut dst = tokio::fs::File::create(dest).await?;
        self.bot.download_file(&file.path, &mut dst).await?;
        dst.flush().await?;
        debug!(file_id = %attachment.file_id, path = %dest.display(), "Downloaded attachment");
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.bot
            .send_message(self.chat_id, text)
            .reply_parameters(self.reply_params())
            .await?;
        Ok(())
    }

    async fn send_voice(&self, path: &Path) -> Result<()> {
        self.bot
            .send_voice(self.chat_id, InputFile::file(path.to_path_buf()))
            .reply_parameters(self.reply_params())
            .await?;
        Ok(())
    }

    async fn send_video_note(
        &self,
        path: &Path,
        side: u32,
        duration_secs: Option<u32>,
    ) -> Result<()> {
        let mut req = self
            .bot
            .send_video_note(self.chat_id, InputFile::file(path.to_path_buf()))
            .length(side)
            .reply_parameters(self.reply_params());
        if let Some(secs) = duration_secs {
            req = req.duration(secs);
        }
        req.await?;
        Ok(())
    }

    async fn send_video(&self, path: &Path) -> Result<()> {
        self.bot
            .send_video(self.chat_id, InputFile::file(path.to_path_buf()))
            .supports_streaming(true)
            .reply_parameters(self.reply_params())
            .await?;
        Ok(())
    }

    async fn notify_working(&self, profile: TargetProfile) -> Result<()> {
        let action = match profile {
            TargetProfile::Voice => ChatAction::RecordVoice,
            TargetProfile::VideoNote => ChatAction::RecordVideoNote,
        };
        self.bot.send_chat_action(self.chat_id, action).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::handlers::has_attachment;
    use crate::relay::MediaKind;
    use serde_json::{json, Value};

    fn message(media: Value) -> Result<Message, serde_json::Error> {
        let mut msg = json!({
            "message_id": 7,
            "date": 1,
            "chat": { "id": 42, "type": "private", "first_name": "Alice" },
            "from": { "id": 1001, "is_bot": false, "first_name": "Alice" }
        });
        if let (Some(obj), Some(extra)) = (msg.as_object_mut(), media.as_object()) {
            obj.extend(extra.clone());
        }
        serde_json::from_value(msg)
    }

    #[test]
    fn test_document_attachment() -> Result<(), serde_json::Error> {
        let msg = message(json!({
            "document": {
                "file_id": "doc-id",
                "file_unique_id": "doc-unique",
                "file_name": "song.mp3",
                "mime_type": "audio/mpeg",
                "file_size": 4096
            }
        }))?;

        let attachment = attachment_from_message(&msg);
        assert_eq!(
            attachment,
            Some(IncomingAttachment {
                file_id: "doc-id".into(),
                file_name: Some("song.mp3".into()),
                mime_type: Some("audio/mpeg".into()),
                size: 4096,
            })
        );
        assert_eq!(attachment.and_then(|a| a.kind()), Some(MediaKind::Mp3));
        assert!(has_attachment(&msg));
        Ok(())
    }

    #[test]
    fn test_audio_attachment() -> Result<(), serde_json::Error> {
        let msg = message(json!({
            "audio": {
                "file_id": "audio-id",
                "file_unique_id": "audio-unique",
                "duration": 180,
                "file_name": "track.MP3",
                "mime_type": "audio/mpeg",
                "file_size": 3_000_000
            }
        }))?;

        let attachment = attachment_from_message(&msg);
        assert_eq!(attachment.as_ref().map(|a| a.size), Some(3_000_000));
        assert_eq!(
            attachment.as_ref().and_then(|a| a.file_name.as_deref()),
            Some("track.MP3")
        );
        assert_eq!(attachment.and_then(|a| a.kind()), Some(MediaKind::Mp3));
        Ok(())
    }

    #[test]
    fn test_video_attachment_carries_declared_size() -> Result<(), serde_json::Error> {
        let msg = message(json!({
            "video": {
                "file_id": "video-id",
                "file_unique_id": "video-unique",
                "width": 1280,
                "height": 720,
                "duration": 12,
                "mime_type": "video/mp4",
                "file_size": 25_000_000
            }
        }))?;

        let attachment = attachment_from_message(&msg);
        assert_eq!(
            attachment,
            Some(IncomingAttachment {
                file_id: "video-id".into(),
                file_name: None,
                mime_type: Some("video/mp4".into()),
                size: 25_000_000,
            })
        );
        assert_eq!(attachment.and_then(|a| a.kind()), Some(MediaKind::Mp4));
        Ok(())
    }

    #[test]
    fn test_voice_attachment_is_unsupported_kind() -> Result<(), serde_json::Error> {
        let msg = message(json!({
            "voice": {
                "file_id": "voice-id",
                "file_unique_id": "voice-unique",
                "duration": 3,
                "mime_type": "audio/ogg",
                "file_size": 123
            }
        }))?;

        let attachment = attachment_from_message(&msg);
        assert_eq!(attachment.as_ref().map(|a| a.file_id.as_str()), Some("voice-id"));
        assert_eq!(attachment.as_ref().map(|a| a.size), Some(123));
        assert_eq!(
            attachment.as_ref().and_then(|a| a.mime_type.as_deref()),
            Some("audio/ogg")
        );
        assert_eq!(attachment.and_then(|a| a.kind()), None);
        Ok(())
    }

    #[test]
    fn test_text_message_has_no_attachment() -> Result<(), serde_json::Error> {
        let msg = message(json!({ "text": "hello" }))?;
        assert_eq!(attachment_from_message(&msg), None);
        assert!(!has_attachment(&msg));
        Ok(())
    }
}
