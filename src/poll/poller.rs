use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use thiserror::Error;

use super::dispatch::{DispatchReport, Dispatcher};
use super::scheduler::Job;
use super::tracker::{Diff, Tracker};
use crate::feed::{FeedSource, FetchError, FetchErrorKind};
use crate::storage::{CursorStore, StoreError, SubscriptionStore, UserId};
use crate::transport::{DeliveryError, Notification, Transport};

/// Default and upper bound for [`Poller::fetch_latest`].
pub const DEFAULT_FETCH_COUNT: usize = 4;
pub const MAX_FETCH_COUNT: usize = 10;

/// Handles the cycle runs against. Cloned `Arc`s, no globals.
#[derive(Clone)]
pub struct PollContext {
    pub store: Arc<dyn SubscriptionStore>,
    pub cursors: Arc<dyn CursorStore>,
    pub source: Arc<dyn FeedSource>,
    pub transport: Arc<dyn Transport>,
}

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    /// Feeds fetched at once within a cycle.
    pub fetch_concurrency: usize,
    /// Sends in flight at once for one entry.
    pub dispatch_concurrency: usize,
    /// Minimum number of entry ids remembered per feed.
    pub seen_window: usize,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            fetch_concurrency: 10,
            dispatch_concurrency: 8,
            seen_window: 200,
        }
    }
}

/// Why a feed was left untouched this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    FetchTransient,
    FetchMalformed,
    StoreUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// First fetch of the feed; cursor created, nothing sent.
    Seeded,
    /// Fetched fine, nothing new.
    Unchanged,
    Delivered {
        new_entries: usize,
        report: DispatchReport,
    },
    /// Cursor not committed; the feed is retried next cycle.
    Skipped(SkipReason),
}

/// Per-feed outcomes of one cycle, in completion order.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub feeds: Vec<(String, FeedOutcome)>,
}

impl CycleReport {
    pub fn outcome(&self, url: &str) -> Option<&FeedOutcome> {
        self.feeds.iter().find(|(u, _)| u == url).map(|(_, o)| o)
    }

    pub fn delivered(&self) -> usize {
        self.feeds
            .iter()
            .map(|(_, o)| match o {
                FeedOutcome::Delivered { report, .. } => report.delivered,
                _ => 0,
            })
            .sum()
    }

    pub fn skipped(&self) -> usize {
        self.feeds
            .iter()
            .filter(|(_, o)| matches!(o, FeedOutcome::Skipped(_)))
            .count()
    }
}

#[derive(Debug, Error)]
pub enum ManualFetchError {
    #[error("No subscription named '{0}'")]
    UnknownAlias(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The user cannot be reached; they have been deactivated.
    #[error(transparent)]
    Rejected(DeliveryError),
}

/// Runs poll cycles: fetch every followed feed, announce what is new,
/// then record it.
pub struct Poller {
    ctx: PollContext,
    tracker: Tracker,
    dispatcher: Dispatcher,
    options: PollOptions,
}

impl Poller {
    pub fn new(ctx: PollContext, options: PollOptions) -> Self {
        let tracker = Tracker::new(Arc::clone(&ctx.cursors), options.seen_window);
        let dispatcher = Dispatcher::new(
            Arc::clone(&ctx.store),
            Arc::clone(&ctx.transport),
            options.dispatch_concurrency,
        );
        Self {
            ctx,
            tracker,
            dispatcher,
            options,
        }
    }

    /// One full cycle over every feed with an active subscriber.
    ///
    /// Only a failure to list the feeds is returned; everything after that
    /// is contained per feed and reported in the [`CycleReport`].
    pub async fn run_cycle(&self) -> Result<CycleReport, StoreError> {
        let urls = self.ctx.store.list_active_feed_urls().await?;
        tracing::debug!(feeds = urls.len(), "Starting poll cycle");

        let feeds: Vec<(String, FeedOutcome)> = stream::iter(urls)
            .map(|url| async move {
                let outcome = self.poll_feed(&url).await;
                (url, outcome)
            })
            .buffer_unordered(self.options.fetch_concurrency.max(1))
            .collect()
            .await;

        Ok(CycleReport { feeds })
    }

    /// fetch, diff, dispatch, commit for a single feed.
    pub async fn poll_feed(&self, url: &str) -> FeedOutcome {
        // Taken before the fetch: only subscriptions that already existed
        // when the feed was read may take this fetch as their baseline.
        let watermark = match self.ctx.store.seeding_watermark().await {
            Ok(watermark) => watermark,
            Err(e) => return store_unavailable(url, e),
        };

        let entries = match self.ctx.source.fetch(url).await {
            Ok(entries) => entries,
            Err(e) => {
                let reason = match e.kind() {
                    FetchErrorKind::Transient => SkipReason::FetchTransient,
                    FetchErrorKind::Malformed => SkipReason::FetchMalformed,
                };
                tracing::warn!(feed = %url, error = %e, reason = ?reason, "Skipping feed this cycle");
                return FeedOutcome::Skipped(reason);
            }
        };

        let diff = match self.tracker.diff(url, &entries).await {
            Ok(diff) => diff,
            Err(e) => return store_unavailable(url, e),
        };

        let outcome = match diff {
            Diff::Seed => {
                tracing::info!(feed = %url, entries = entries.len(), "Seeding cursor");
                FeedOutcome::Seeded
            }
            Diff::New(new) if new.is_empty() => FeedOutcome::Unchanged,
            Diff::New(new) => {
                let subscribers = match self.ctx.store.list_active_subscribers_of(url).await {
                    Ok(subscribers) => subscribers,
                    Err(e) => return store_unavailable(url, e),
                };
                let report = self.dispatcher.dispatch(url, &new, &subscribers).await;
                tracing::info!(
                    feed = %url,
                    new_entries = new.len(),
                    delivered = report.delivered,
                    rejected = report.rejected,
                    failed = report.failed,
                    "Dispatched new entries"
                );
                FeedOutcome::Delivered {
                    new_entries: new.len(),
                    report,
                }
            }
        };

        if let Err(e) = self.tracker.commit(url, &entries).await {
            return store_unavailable(url, e);
        }

        match self.ctx.store.mark_subscriptions_seeded(url, watermark).await {
            Ok(0) => {}
            Ok(n) => tracing::debug!(feed = %url, subscriptions = n, "Seeded new subscriptions"),
            Err(e) => tracing::warn!(feed = %url, error = %e, "Failed to mark subscriptions seeded"),
        }

        outcome
    }

    /// Send the `count` newest entries of one of `user`'s feeds right now.
    ///
    /// Cursors are neither read nor written, so the periodic cycle is
    /// unaffected. Returns the number of notifications delivered.
    pub async fn fetch_latest(
        &self,
        user: UserId,
        alias: &str,
        count: Option<usize>,
    ) -> Result<usize, ManualFetchError> {
        let bookmark = self
            .ctx
            .store
            .get_bookmark(user, alias)
            .await?
            .ok_or_else(|| ManualFetchError::UnknownAlias(alias.to_string()))?;

        let count = count
            .unwrap_or(DEFAULT_FETCH_COUNT)
            .clamp(1, MAX_FETCH_COUNT);
        let entries = self.ctx.source.fetch(&bookmark.url).await?;

        let mut delivered = 0;
        for entry in entries.iter().take(count).rev() {
            let notification = Notification::for_entry(entry, &bookmark.alias, &bookmark.url);
            match self.dispatcher.transport().send(user, &notification).await {
                Ok(()) => delivered += 1,
                Err(e @ DeliveryError::Permanent(_)) => {
                    self.dispatcher.deactivate(user).await;
                    return Err(ManualFetchError::Rejected(e));
                }
                Err(DeliveryError::Transient(reason)) => {
                    tracing::warn!(user = user, feed = %bookmark.url, reason = %reason, "Notification failed");
                }
            }
        }

        Ok(delivered)
    }
}

fn store_unavailable(url: &str, e: StoreError) -> FeedOutcome {
    tracing::warn!(feed = %url, error = %e, "Store unavailable, skipping feed this cycle");
    FeedOutcome::Skipped(SkipReason::StoreUnavailable)
}

#[async_trait]
impl Job for Poller {
    fn name(&self) -> &'static str {
        "poll"
    }

    async fn execute(&self) {
        match self.run_cycle().await {
            Ok(report) => tracing::info!(
                feeds = report.feeds.len(),
                delivered = report.delivered(),
                skipped = report.skipped(),
                "Poll cycle finished"
            ),
            Err(e) => tracing::warn!(error = %e, "Poll cycle aborted: could not list feeds"),
        }
    }
}
