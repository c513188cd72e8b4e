use async_trait::async_trait;

use super::types::{Bookmark, Cursor, StoreError, Subscriber, UserId};

/// What the poll cycle needs from the subscription store.
///
/// Implemented by [`Database`](super::Database); tests wrap it to inject
/// failures.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Distinct feed URLs with at least one active subscriber, seeded or not.
    async fn list_active_feed_urls(&self) -> Result<Vec<String>, StoreError>;

    /// Active users whose bookmark of `url` has been seeded.
    async fn list_active_subscribers_of(&self, url: &str) -> Result<Vec<Subscriber>, StoreError>;

    /// Returns `true` if the flag changed. Setting the current value is a no-op.
    async fn set_user_active(&self, user: UserId, active: bool) -> Result<bool, StoreError>;

    /// Current value of the seeding clock. Read before fetching a feed; any
    /// bookmark created or re-activated afterwards carries a larger epoch.
    async fn seeding_watermark(&self) -> Result<i64, StoreError>;

    /// Mark bookmarks of `url` with an epoch at or below `watermark` as
    /// seeded; called after the feed's cursor commit.
    async fn mark_subscriptions_seeded(&self, url: &str, watermark: i64) -> Result<u64, StoreError>;

    async fn get_bookmark(&self, user: UserId, alias: &str)
        -> Result<Option<Bookmark>, StoreError>;
}

/// Durable per-feed seen-entry state. Must survive a process restart.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// `None` means the feed has never been committed.
    async fn load_cursor(&self, url: &str) -> Result<Option<Cursor>, StoreError>;

    /// Replace the feed's cursor atomically.
    async fn save_cursor(&self, url: &str, cursor: &Cursor) -> Result<(), StoreError>;
}
