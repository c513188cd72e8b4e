use async_trait::async_trait;

use super::schema::{next_seed_epoch, Database};
use super::traits::SubscriptionStore;
use super::types::{Bookmark, StoreError, Subscriber, UserId};

impl Database {
    // ========================================================================
    // Bookmark Operations
    // ========================================================================

    /// Subscribe a registered user to `url` under `alias`.
    ///
    /// `url` is stored as given; callers normalise it first
    /// (see [`normalize_feed_url`](crate::util::normalize_feed_url)).
    /// The new bookmark starts unseeded.
    pub async fn add_bookmark(
        &self,
        user_id: UserId,
        url: &str,
        alias: &str,
    ) -> Result<Bookmark, StoreError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let user: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if user.is_none() {
            return Err(StoreError::UnknownUser(user_id));
        }

        let conflicts: Vec<(String, String)> =
            sqlx::query_as("SELECT url, alias FROM bookmarks WHERE user_id = ? AND (url = ? OR alias = ?)")
                .bind(user_id)
                .bind(url)
                .bind(alias)
                .fetch_all(&mut *tx)
                .await?;
        if conflicts.iter().any(|(u, _)| u == url) {
            return Err(StoreError::DuplicateUrl(url.to_string()));
        }
        if !conflicts.is_empty() {
            return Err(StoreError::DuplicateAlias(alias.to_string()));
        }

        let epoch = next_seed_epoch(&mut tx).await?;
        let bookmark = sqlx::query_as::<_, Bookmark>(
            r#"
            INSERT INTO bookmarks (user_id, url, alias, seeded, seed_epoch, created_at)
            VALUES (?, ?, ?, 0, ?, ?)
            RETURNING id, user_id, url, alias, seeded, created_at
        "#,
        )
        .bind(user_id)
        .bind(url)
        .bind(alias)
        .bind(epoch)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(user = user_id, alias = %alias, feed = %url, "Added bookmark");
        Ok(bookmark)
    }

    /// Remove one of a user's bookmarks by alias, returning it if it existed.
    ///
    /// Other users' bookmarks of the same URL and the feed's cursor are untouched.
    pub async fn remove_bookmark(
        &self,
        user_id: UserId,
        alias: &str,
    ) -> Result<Option<Bookmark>, StoreError> {
        let removed = sqlx::query_as::<_, Bookmark>(
            r#"
            DELETE FROM bookmarks
            WHERE user_id = ? AND alias = ?
            RETURNING id, user_id, url, alias, seeded, created_at
        "#,
        )
        .bind(user_id)
        .bind(alias)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(b) = &removed {
            tracing::info!(user = user_id, alias = %alias, feed = %b.url, "Removed bookmark");
        }
        Ok(removed)
    }

    pub async fn get_user_bookmark(
        &self,
        user_id: UserId,
        alias: &str,
    ) -> Result<Option<Bookmark>, StoreError> {
        let bookmark = sqlx::query_as::<_, Bookmark>(
            r#"
            SELECT id, user_id, url, alias, seeded, created_at
            FROM bookmarks
            WHERE user_id = ? AND alias = ?
        "#,
        )
        .bind(user_id)
        .bind(alias)
        .fetch_optional(&self.pool)
        .await?;
        Ok(bookmark)
    }

    /// All bookmarks of a user, ordered by alias
    pub async fn list_bookmarks(&self, user_id: UserId) -> Result<Vec<Bookmark>, StoreError> {
        let bookmarks = sqlx::query_as::<_, Bookmark>(
            r#"
            SELECT id, user_id, url, alias, seeded, created_at
            FROM bookmarks
            WHERE user_id = ?
            ORDER BY alias
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookmarks)
    }
}

#[async_trait]
impl SubscriptionStore for Database {
    async fn list_active_feed_urls(&self) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT b.url
            FROM bookmarks b
            JOIN users u ON u.id = b.user_id
            WHERE u.is_active = 1
            ORDER BY b.url
        "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(url,)| url).collect())
    }

    async fn list_active_subscribers_of(&self, url: &str) -> Result<Vec<Subscriber>, StoreError> {
        let subscribers = sqlx::query_as::<_, Subscriber>(
            r#"
            SELECT b.user_id, b.alias
            FROM bookmarks b
            JOIN users u ON u.id = b.user_id
            WHERE b.url = ? AND b.seeded = 1 AND u.is_active = 1
            ORDER BY b.user_id
        "#,
        )
        .bind(url)
        .fetch_all(&self.pool)
        .await?;
        Ok(subscribers)
    }

    async fn set_user_active(&self, user: UserId, active: bool) -> Result<bool, StoreError> {
        self.update_user_active(user, active).await
    }

    async fn seeding_watermark(&self) -> Result<i64, StoreError> {
        let (value,): (i64,) = sqlx::query_as("SELECT value FROM seed_clock WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(value)
    }

    async fn mark_subscriptions_seeded(&self, url: &str, watermark: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE bookmarks SET seeded = 1 WHERE url = ? AND seeded = 0 AND seed_epoch <= ?",
        )
        .bind(url)
        .bind(watermark)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_bookmark(
        &self,
        user: UserId,
        alias: &str,
    ) -> Result<Option<Bookmark>, StoreError> {
        self.get_user_bookmark(user, alias).await
    }
}
