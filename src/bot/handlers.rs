use super::transport::{attachment_from_message, TelegramReplyTransport};
use super::UnauthorizedCache;
use crate::relay::{usage_text, MediaRelay, NO_MEDIA_TEXT};
use anyhow::Result;
use std::sync::Arc;
use teloxide::{prelude::*, utils::command::BotCommands};
use tracing::{info, warn};

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

fn get_user_name(msg: &Message) -> String {
    msg.from
        .as_ref()
        .map(|u| u.username.clone().unwrap_or_else(|| u.first_name.clone()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Whether the message carries something the relay could look at
#[must_use]
pub fn has_attachment(msg: &Message) -> bool {
    attachment_from_message(msg).is_some()
}

/// Supported commands for the bot
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show what the bot converts
    #[command(description = "Start the bot.")]
    Start,
    #[command(description = "Show supported formats and limits.")]
    Help,
}

/// Reply to `/start` and `/help` with the usage text
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn start(bot: Bot, msg: Message, relay: Arc<MediaRelay>) -> Result<()> {
    info!(user = %get_user_name(&msg), "Start command");
    bot.send_message(msg.chat.id, usage_text(&relay.limits()))
        .await?;
    Ok(())
}

/// Relay the attachment of `msg` and reply with the converted file
///
/// # Errors
///
/// Never fails in practice: relay errors are reported to the user instead.
pub async fn handle_media(bot: Bot, msg: Message, relay: Arc<MediaRelay>) -> Result<()> {
    let Some(attachment) = attachment_from_message(&msg) else {
        warn!("Media handler invoked without attachment");
        return handle_no_media(bot, msg).await;
    };

    let transport = TelegramReplyTransport::for_message(bot, &msg);
    relay.handle(&attachment, &transport).await;
    Ok(())
}

/// Anything that is neither a command nor media
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn handle_no_media(bot: Bot, msg: Message) -> Result<()> {
    bot.send_message(msg.chat.id, NO_MEDIA_TEXT).await?;
    Ok(())
}

/// Deny access, at most once per cooldown window per user
///
/// # Errors
///
/// Returns an error if the denial cannot be sent.
pub async fn handle_unauthorized(
    bot: Bot,
    msg: Message,
    cache: Arc<UnauthorizedCache>,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    if !cache.should_send(user_id) {
        return Ok(());
    }

    info!(
        user_id,
        user = %get_user_name(&msg),
        "⛔️ Unauthorized access. Sending denial message."
    );
    bot.send_message(msg.chat.id, "⛔️ Access denied").await?;
    cache.mark_sent(user_id).await;
    Ok(())
}
