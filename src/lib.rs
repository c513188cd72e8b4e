//! Telegram RSS notification bot.
//!
//! Users subscribe to feeds under an alias; a background [`poll::Scheduler`]
//! re-fetches every followed feed on a fixed interval and sends each
//! subscriber one message per entry that appeared since the last poll.

pub mod config;
pub mod feed;
pub mod poll;
pub mod storage;
pub mod transport;
pub mod util;
