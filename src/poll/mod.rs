//! The polling engine.
//!
//! Each cycle enumerates the feeds that have an active subscriber, fetches
//! them concurrently, and per feed runs:
//!
//! 1. [`Tracker::diff`] against the stored cursor (a pure read)
//! 2. [`Dispatcher::dispatch`] of the new entries to seeded subscribers
//! 3. [`Tracker::commit`] of the fetched ids, all-or-nothing
//!
//! A fetch or store failure skips the feed for the cycle without touching
//! its cursor. The [`Scheduler`] drives [`Poller`] on a fixed interval and
//! never lets two cycles overlap.

mod dispatch;
mod poller;
mod scheduler;
mod tracker;

pub use dispatch::{DispatchReport, Dispatcher};
pub use poller::{
    CycleReport, FeedOutcome, ManualFetchError, PollContext, PollOptions, Poller, SkipReason,
    DEFAULT_FETCH_COUNT, MAX_FETCH_COUNT,
};
pub use scheduler::{Job, Scheduler, SchedulerHandle, SchedulerStats};
pub use tracker::{Diff, Tracker};
