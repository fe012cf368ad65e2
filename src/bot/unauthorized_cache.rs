//! Cooldown for "Access denied" replies.
//!
//! Users outside the allow-list get one denial per cooldown window; further
//! attempts inside the window are dropped silently so a spammer cannot make
//! the bot hit Telegram's rate limits.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Log one line per this many silenced attempts
const SILENCED_LOG_EVERY: u64 = 100;

/// Tracks which users were recently told they are not allowed in
#[derive(Clone)]
pub struct UnauthorizedCache {
    /// user_id -> () for users inside their cooldown window
    cache: Cache<i64, ()>,
    silenced_count: Arc<AtomicU64>,
}

impl UnauthorizedCache {
    /// Creates a cache whose entries expire after `cooldown_secs`.
    ///
    /// `ttl_secs` bounds how long an entry lives at all and `max_capacity`
    /// how many users are tracked at once.
    ///
    /// ```
    /// use media_relay_bot::bot::UnauthorizedCache;
    ///
    /// let cache = UnauthorizedCache::new(1200, 7200, 10_000);
    /// assert_eq!(cache.silenced_count(), 0);
    /// ```
    #[must_use]
    pub fn new(cooldown_secs: u64, ttl_secs: u64, max_capacity: u64) -> Self {
        let window = Duration::from_secs(cooldown_secs.min(ttl_secs));
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(window)
            .build();

        Self {
            cache,
            silenced_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether a denial reply should go out to `user_id` now
    pub fn should_send(&self, user_id: i64) -> bool {
        if !self.cache.contains_key(&user_id) {
            return true;
        }

        let count = self.silenced_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count.is_multiple_of(SILENCED_LOG_EVERY) {
            debug!(count, user_id, "⛔️ Silenced unauthorized attempts");
        }
        false
    }

    /// Start the cooldown window for `user_id` after a denial was delivered
    pub async fn mark_sent(&self, user_id: i64) {
        self.cache.insert(user_id, ()).await;
    }

    #[must_use]
    pub fn silenced_count(&self) -> u64 {
        self.silenced_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_attempt_should_send() {
        let cache = UnauthorizedCache::new(60, 120, 100);
        assert!(cache.should_send(12345));
    }

    #[tokio::test]
    async fn test_cooldown_blocks_second_attempt() {
        let cache = UnauthorizedCache::new(60, 120, 100);

        assert!(cache.should_send(12345));
        cache.mark_sent(12345).await;
        assert!(!cache.should_send(12345));
    }

    #[tokio::test]
    async fn test_different_users_independent() {
        let cache = UnauthorizedCache::new(60, 120, 100);

        cache.mark_sent(111).await;
        assert!(cache.should_send(222));
    }

    #[tokio::test]
    async fn test_silenced_count_increments() {
        let cache = UnauthorizedCache::new(60, 120, 100);

        cache.mark_sent(12345).await;
        for _ in 0..5 {
            cache.should_send(12345);
        }
        assert_eq!(cache.silenced_count(), 5);
    }

    #[tokio::test]
    async fn test_cooldown_expires() {
        let cache = UnauthorizedCache::new(1, 120, 100);

        cache.mark_sent(7).await;
        assert!(!cache.should_send(7));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(cache.should_send(7));
    }
}
