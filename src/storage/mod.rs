//! SQLite persistence for users, bookmarks and per-feed seen-entry cursors.
//!
//! [`Database`] implements both seams the poll cycle consumes:
//! [`SubscriptionStore`] and [`CursorStore`]. The remaining inherent methods
//! (registration, add/remove/list bookmarks) serve the command front end.

mod bookmarks;
mod cursors;
mod schema;
mod traits;
mod types;
mod users;

pub use schema::Database;
pub use traits::{CursorStore, SubscriptionStore};
pub use types::{
    Bookmark, Cursor, NewUser, Registration, StoreError, Subscriber, User, UserId,
};
