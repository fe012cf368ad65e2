/// Command and message handlers
pub mod handlers;
/// Telegram side of the relay
pub mod transport;
/// Cooldown for access-denied replies
pub mod unauthorized_cache;

pub use transport::TelegramReplyTransport;
pub use unauthorized_cache::UnauthorizedCache;
