//! Feed retrieval for RSS, Atom and JSON feeds.
//!
//! - [`parser`] - turns a feed document into normalised [`Entry`] records
//!   using the `feed-rs` crate, resolving each entry's identifier once
//! - [`fetcher`] - the [`FeedSource`] seam and its HTTP implementation with
//!   timeouts, retry/backoff and a response size cap
//!
//! The poll cycle only ever sees `Vec<Entry>` or a [`FetchError`]; it never
//! reads the classification of an error as "nothing new".

mod fetcher;
mod parser;

pub use fetcher::{
    build_http_client, FeedSource, FetchError, FetchErrorKind, FetchPolicy, HttpFeedSource,
};
pub use parser::{parse_entries, resolve_entry_id, Entry};
