use super::schema::{next_seed_epoch, Database};
use super::types::{NewUser, Registration, StoreError, User, UserId};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Register a user, or re-activate one that opted out.
    ///
    /// Profile fields that are given replace the stored ones; omitted fields
    /// keep their previous value. Re-activation also marks the user's
    /// bookmarks unseeded so entries published while they were away are not
    /// flushed at them on the next poll.
    pub async fn register_user(&self, user: &NewUser) -> Result<Registration, StoreError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let existing: Option<(bool,)> = sqlx::query_as("SELECT is_active FROM users WHERE id = ?")
            .bind(user.id)
            .fetch_optional(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, username, first_name, last_name, language_code, is_bot, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            ON CONFLICT(id) DO UPDATE SET
                username = COALESCE(excluded.username, users.username),
                first_name = COALESCE(excluded.first_name, users.first_name),
                last_name = COALESCE(excluded.last_name, users.last_name),
                language_code = COALESCE(excluded.language_code, users.language_code),
                is_bot = excluded.is_bot,
                is_active = 1
        "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.language_code)
        .bind(user.is_bot)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let outcome = match existing {
            None => Registration::Created,
            Some((true,)) => Registration::AlreadyActive,
            Some((false,)) => {
                let epoch = next_seed_epoch(&mut tx).await?;
                sqlx::query("UPDATE bookmarks SET seeded = 0, seed_epoch = ? WHERE user_id = ?")
                    .bind(epoch)
                    .bind(user.id)
                    .execute(&mut *tx)
                    .await?;
                Registration::Reactivated
            }
        };

        tx.commit().await?;
        tracing::info!(user = user.id, outcome = ?outcome, "Registered user");
        Ok(outcome)
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, first_name, last_name, language_code, is_bot, is_active, created_at
            FROM users
            WHERE id = ?
        "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Flip a user's active flag. Returns `false` when it already had that value.
    pub(crate) async fn update_user_active(
        &self,
        id: UserId,
        active: bool,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE users SET is_active = ? WHERE id = ? AND is_active != ?")
            .bind(active)
            .bind(id)
            .bind(active)
            .execute(&mut *tx)
            .await?;
        let changed = result.rows_affected() > 0;

        if changed && active {
            let epoch = next_seed_epoch(&mut tx).await?;
            sqlx::query("UPDATE bookmarks SET seeded = 0, seed_epoch = ? WHERE user_id = ?")
                .bind(epoch)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(changed)
    }
}
