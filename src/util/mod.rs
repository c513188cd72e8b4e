//! Input validation shared by the CLI and the store.
//!
//! - **Feed URLs**: canonical form plus the SSRF policy, see [`normalize_feed_url`]

mod url_validator;

pub use url_validator::{normalize_feed_url, UrlValidationError};
