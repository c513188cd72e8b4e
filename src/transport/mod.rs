//! Outbound delivery of new-entry notifications.
//!
//! The poll cycle talks to a [`Transport`] and only cares about the three
//! outcomes of a send: delivered, rejected for good, or failed for now.

mod telegram;

pub use telegram::{TelegramTransport, DEFAULT_TELEGRAM_API_URL};

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::feed::Entry;
use crate::storage::UserId;

/// Why a single send did not go through.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The recipient cannot be reached at all (blocked the bot, deleted the
    /// chat). The user gets deactivated.
    #[error("Recipient rejected delivery: {0}")]
    Permanent(String),
    /// Anything else. Logged and dropped; the send is not retried this cycle.
    #[error("Delivery failed: {0}")]
    Transient(String),
}

impl DeliveryError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, DeliveryError::Permanent(_))
    }
}

/// One message about one entry for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub link: Option<String>,
    /// The subscriber's name for the feed.
    pub alias: String,
    /// The feed URL the entry came from.
    pub source: String,
}

impl Notification {
    pub fn for_entry(entry: &Entry, alias: &str, source: &str) -> Self {
        let title = if entry.title.is_empty() {
            "Untitled".to_string()
        } else {
            entry.title.clone()
        };
        Self {
            title,
            link: entry.link.clone(),
            alias: alias.to_string(),
            source: source.to_string(),
        }
    }
}

/// Plain-text rendering used by every transport. The footer names the
/// subscriber's alias and the feed URL.
impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        if let Some(link) = &self.link {
            writeln!(f, "{}", link)?;
        }
        write!(f, "\nvia {} | {}", self.alias, self.source)
    }
}

/// A message delivery channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attempt delivery exactly once.
    async fn send(&self, user: UserId, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Writes notifications to the log instead of sending them (`run --dry-run`).
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, user: UserId, notification: &Notification) -> Result<(), DeliveryError> {
        tracing::info!(
            user = user,
            alias = %notification.alias,
            feed = %notification.source,
            title = %notification.title,
            link = notification.link.as_deref().unwrap_or(""),
            "Notification (dry run)"
        );
        Ok(())
    }
}
