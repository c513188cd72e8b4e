use std::collections::HashSet;
use thiserror::Error;

use crate::feed::Entry;

// ============================================================================
// Error Types
// ============================================================================

/// Store errors with user-friendly messages
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds the database lock
    #[error("Database is locked by another process. Please try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// The store could not serve the request; poll cycles retry next tick
    #[error("Store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    #[error("Unknown user {0}; register first")]
    UnknownUser(UserId),

    #[error("You already have a subscription named '{0}'")]
    DuplicateAlias(String),

    #[error("You are already subscribed to {0}")]
    DuplicateUrl(String),
}

impl StoreError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StoreError::InstanceLocked;
        }

        StoreError::Unavailable(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Chat-platform user identifier (a Telegram chat id fits in `i64`).
pub type UserId = i64;

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub is_bot: bool,
    pub is_active: bool,
    pub created_at: i64,
}

/// Profile data supplied on registration
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub is_bot: bool,
}

impl NewUser {
    pub fn with_id(id: UserId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

/// Result of [`register_user`](super::Database::register_user)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    Reactivated,
    AlreadyActive,
}

/// A user's named binding to a feed URL.
///
/// `seeded` is false until the first poll of `url` whose fetch started after
/// the bookmark was created (or its owner re-activated); unseeded bookmarks
/// receive nothing.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Bookmark {
    pub id: i64,
    pub user_id: UserId,
    pub url: String,
    pub alias: String,
    pub seeded: bool,
    pub created_at: i64,
}

/// One recipient of a feed's new entries
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct Subscriber {
    pub user_id: UserId,
    pub alias: String,
}

// ============================================================================
// Seen-Entry Cursor
// ============================================================================

/// The bounded window of entry identifiers already accounted for on a feed.
///
/// Ids are kept most-recently-seen first. Advancing never drops an id that is
/// still present in the latest fetch, so a feed longer than the window is not
/// re-announced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    ids: Vec<String>,
    index: HashSet<String>,
}

impl Cursor {
    pub fn from_ids(ids: impl IntoIterator<Item = String>) -> Self {
        let mut cursor = Self::default();
        for id in ids {
            if cursor.index.insert(id.clone()) {
                cursor.ids.push(id);
            }
        }
        cursor
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Merge a fetch into the window.
    ///
    /// Fetched ids go first in document order, older ids follow, and the
    /// result is trimmed to `max(window, fetched ids)`.
    pub fn advance(&self, fetched: &[Entry], window: usize) -> Cursor {
        let mut next = Cursor::from_ids(fetched.iter().map(|e| e.id.clone()));
        let keep = window.max(next.len());

        for id in &self.ids {
            if next.len() >= keep {
                break;
            }
            if next.index.insert(id.clone()) {
                next.ids.push(id.clone());
            }
        }

        next
    }
}
