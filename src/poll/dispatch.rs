use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;

use crate::feed::Entry;
use crate::storage::{Subscriber, SubscriptionStore, UserId};
use crate::transport::{DeliveryError, Notification, Transport};

/// Tally of one feed's fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Permanent rejections.
    pub rejected: usize,
    /// Transient failures; these notifications are lost once the cursor commits.
    pub failed: usize,
    /// Users switched to inactive during this dispatch.
    pub deactivated: Vec<UserId>,
}

/// Fans new entries out to subscribers through a [`Transport`].
///
/// Each recipient is independent: a failure is recorded and the batch
/// carries on. Sends for one entry run concurrently up to `concurrency`.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn SubscriptionStore>,
    transport: Arc<dyn Transport>,
    concurrency: usize,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        transport: Arc<dyn Transport>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            transport,
            concurrency: concurrency.max(1),
        }
    }

    /// Deliver `entries` (newest first, as fetched) oldest first.
    ///
    /// A user rejected permanently is skipped for the remaining entries.
    pub async fn dispatch(
        &self,
        url: &str,
        entries: &[Entry],
        subscribers: &[Subscriber],
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut gone: HashSet<UserId> = HashSet::new();

        for entry in entries.iter().rev() {
            let recipients: Vec<&Subscriber> = subscribers
                .iter()
                .filter(|s| !gone.contains(&s.user_id))
                .collect();
            if recipients.is_empty() {
                break;
            }

            let results: Vec<(UserId, Result<(), DeliveryError>)> = stream::iter(
                recipients
                    .into_iter()
                    .map(|subscriber| {
                        let notification = Notification::for_entry(entry, &subscriber.alias, url);
                        async move {
                            let result = self.transport.send(subscriber.user_id, &notification).await;
                            (subscriber.user_id, result)
                        }
                    })
                    .collect::<Vec<_>>(),
            )
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for (user, result) in results {
                match result {
                    Ok(()) => report.delivered += 1,
                    Err(DeliveryError::Transient(reason)) => {
                        report.failed += 1;
                        tracing::warn!(
                            user = user,
                            feed = %url,
                            entry = %entry.id,
                            reason = %reason,
                            "Notification failed, dropping it for this cycle"
                        );
                    }
                    Err(DeliveryError::Permanent(reason)) => {
                        report.rejected += 1;
                        gone.insert(user);
                        tracing::info!(user = user, reason = %reason, "Recipient unreachable");
                        if self.deactivate(user).await {
                            report.deactivated.push(user);
                        }
                    }
                }
            }
        }

        report
    }

    /// Returns `true` if the user was active until now.
    pub(crate) async fn deactivate(&self, user: UserId) -> bool {
        match self.store.set_user_active(user, false).await {
            Ok(changed) => {
                if changed {
                    tracing::info!(user = user, "Deactivated user");
                }
                changed
            }
            Err(e) => {
                tracing::warn!(user = user, error = %e, "Failed to deactivate user");
                false
            }
        }
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
}
