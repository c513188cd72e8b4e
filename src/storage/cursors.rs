use async_trait::async_trait;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::traits::CursorStore;
use super::types::{Cursor, StoreError};

#[async_trait]
impl CursorStore for Database {
    async fn load_cursor(&self, url: &str) -> Result<Option<Cursor>, StoreError> {
        let exists: Option<(String,)> = sqlx::query_as("SELECT url FROM feed_cursors WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT entry_id FROM seen_entries WHERE feed_url = ? ORDER BY position",
        )
        .bind(url)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Cursor::from_ids(rows.into_iter().map(|(id,)| id))))
    }

    /// Replaces the whole window in one transaction, so a crash or an
    /// aborted cycle leaves either the old cursor or the new one.
    async fn save_cursor(&self, url: &str, cursor: &Cursor) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO feed_cursors (url, created_at, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET updated_at = excluded.updated_at
        "#,
        )
        .bind(url)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM seen_entries WHERE feed_url = ?")
            .bind(url)
            .execute(&mut *tx)
            .await?;

        const BATCH_SIZE: usize = 100;
        let ids: Vec<(usize, &String)> = cursor.ids().iter().enumerate().collect();
        for chunk in ids.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO seen_entries (feed_url, entry_id, position) ");
            builder.push_values(chunk, |mut b, (position, id)| {
                b.push_bind(url).push_bind(*id).push_bind(*position as i64);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::debug!(feed = %url, window = cursor.len(), "Saved cursor");
        Ok(())
    }
}
