use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A unit of periodic work driven by the [`Scheduler`].
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Name used in log lines.
    fn name(&self) -> &'static str;

    /// Run once. Failures are the job's to log; the scheduler never stops on them.
    async fn execute(&self);
}

/// Counter snapshot taken from a [`SchedulerHandle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles_started: u64,
    pub cycles_completed: u64,
    /// Ticks dropped because the previous cycle was still running.
    pub ticks_skipped: u64,
}

#[derive(Default)]
struct Counters {
    cycles_started: AtomicU64,
    cycles_completed: AtomicU64,
    ticks_skipped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Fixed-interval, single-flight runner for one [`Job`].
///
/// The first tick fires immediately. A tick that arrives while the previous
/// run is still going is dropped, never queued.
pub struct Scheduler;

impl Scheduler {
    pub fn spawn(job: Arc<dyn Job>, interval: Duration) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let counters = Arc::new(Counters::default());
        let task = tokio::spawn(run(job, interval, shutdown_rx, Arc::clone(&counters)));

        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
            counters,
        }
    }
}

/// Owner of a running [`Scheduler`].
///
/// Dropping the handle stops the timer and aborts any run in progress.
pub struct SchedulerHandle {
    shutdown: oneshot::Sender<Duration>,
    task: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl SchedulerHandle {
    pub fn stats(&self) -> SchedulerStats {
        self.counters.snapshot()
    }

    /// Stop ticking and give an in-flight run up to `grace` to finish.
    ///
    /// A run still going after `grace` is aborted at its next await point.
    pub async fn shutdown(self, grace: Duration) -> SchedulerStats {
        // Err means the loop already exited
        let _ = self.shutdown.send(grace);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Scheduler task failed");
        }
        self.counters.snapshot()
    }
}

async fn run(
    job: Arc<dyn Job>,
    interval: Duration,
    mut shutdown: oneshot::Receiver<Duration>,
    counters: Arc<Counters>,
) {
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let slot = Arc::new(Semaphore::new(1));
    let mut in_flight: Option<JoinHandle<()>> = None;

    tracing::info!(job = job.name(), interval_secs = interval.as_secs(), "Scheduler started");

    let grace = loop {
        tokio::select! {
            biased;
            requested = &mut shutdown => break requested.unwrap_or(Duration::ZERO),
            _ = timer.tick() => {
                let Ok(permit) = Arc::clone(&slot).try_acquire_owned() else {
                    counters.ticks_skipped.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(job = job.name(), "Previous run still in progress, skipping tick");
                    continue;
                };

                counters.cycles_started.fetch_add(1, Ordering::Relaxed);
                let job = Arc::clone(&job);
                let counters = Arc::clone(&counters);
                in_flight = Some(tokio::spawn(async move {
                    job.execute().await;
                    counters.cycles_completed.fetch_add(1, Ordering::Relaxed);
                    drop(permit);
                }));
            }
        }
    };

    if let Some(mut task) = in_flight.filter(|t| !t.is_finished()) {
        tracing::info!(job = job.name(), grace_secs = grace.as_secs(), "Waiting for in-flight run");
        match tokio::time::timeout(grace, &mut task).await {
            Ok(_) => tracing::info!(job = job.name(), "In-flight run finished"),
            Err(_) => {
                task.abort();
                tracing::warn!(job = job.name(), "In-flight run aborted after grace period");
            }
        }
    }

    tracing::info!(job = job.name(), "Scheduler stopped");
}
