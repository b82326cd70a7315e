//! The managed polling runner.
//!
//! The runner owns the long-poll loop for one account:
//!
//! 1. Fetch with `offset = last + 1` and the configured long-poll timeout
//! 2. Drop updates the cursor already covers
//! 3. Run the handler for each update, at most `concurrency` at a time
//! 4. Advance the offset in update order as each handler finishes
//!
//! Short network blips are retried here so they never reach the engine.
//! Conflicts and fatal errors are returned at once; the engine decides what
//! they mean for ownership.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::feed::{Classifier, FailureClass, FeedClient, FeedError, FetchParams};
use crate::offset::{OffsetCursor, OffsetStore};
use crate::retry::{BackoffPolicy, sleep_or_cancel};
use crate::types::{Update, UpdateId, default_allowed_updates};

use super::handler::UpdateHandler;

/// Default handler concurrency.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default long-poll timeout (30 seconds).
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Default window for runner-internal network retries (5 minutes).
const DEFAULT_RETRY_WINDOW_SECS: u64 = 300;

/// Configuration for [`PollRunner`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum number of handlers running at once.
    pub concurrency: usize,

    /// Long-poll timeout sent with each fetch.
    pub poll_timeout: Duration,

    /// Update types requested from the feed.
    pub allowed_updates: Vec<String>,

    /// How long a streak of network failures is retried internally before
    /// it is handed to the engine.
    pub retry_window: Duration,

    /// Delays between internal retries.
    pub retry_backoff: BackoffPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            concurrency: DEFAULT_CONCURRENCY,
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            allowed_updates: default_allowed_updates(),
            retry_window: Duration::from_secs(DEFAULT_RETRY_WINDOW_SECS),
            retry_backoff: BackoffPolicy::RUNNER,
        }
    }
}

impl RunnerConfig {
    /// Sets the handler concurrency. Zero is raised to one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// Consecutive network failures seen by the runner.
#[derive(Debug, Clone, Copy)]
struct FailureStreak {
    started: Instant,
    attempts: u32,
}

/// An error surfaced by [`PollRunner::run_reporting`].
#[derive(Debug)]
pub struct RunFailure {
    pub error: FeedError,

    /// How long the run went before its final failure streak began.
    pub healthy_for: Duration,
}

/// Long-polls the feed and feeds updates to a handler.
pub struct PollRunner<'a, C, H> {
    client: &'a C,
    handler: Arc<H>,
    config: &'a RunnerConfig,
    classifier: Classifier,
    permits: Arc<Semaphore>,
}

impl<'a, C, H> PollRunner<'a, C, H>
where
    C: FeedClient,
    H: UpdateHandler,
{
    pub fn new(
        client: &'a C,
        handler: Arc<H>,
        config: &'a RunnerConfig,
        classifier: Classifier,
    ) -> Self {
        PollRunner {
            client,
            handler,
            config,
            classifier,
            permits: Arc::new(Semaphore::new(config.concurrency.max(1))),
        }
    }

    /// Polls until `stop` fires or an error must be surfaced.
    ///
    /// Returns `Ok(())` only when stopped. Conflicts and fatal errors are
    /// returned immediately. Network errors are retried while the failure
    /// streak is younger than the retry window.
    pub async fn run<S: OffsetStore>(
        &self,
        cursor: &mut OffsetCursor<S>,
        stop: &CancellationToken,
    ) -> Result<(), FeedError> {
        self.run_reporting(cursor, stop).await.map_err(|f| f.error)
    }

    /// Like [`run`](Self::run), but also reports how long the run was
    /// healthy before it failed.
    ///
    /// Time spent inside a network failure streak does not count, so a run
    /// that never fetched successfully reports zero.
    pub async fn run_reporting<S: OffsetStore>(
        &self,
        cursor: &mut OffsetCursor<S>,
        stop: &CancellationToken,
    ) -> Result<(), RunFailure> {
        let started = Instant::now();
        let mut streak: Option<FailureStreak> = None;
        let failure = |error: FeedError, streak: Option<FailureStreak>| {
            let failing_since = streak.map_or_else(Instant::now, |s| s.started);
            RunFailure {
                error,
                healthy_for: failing_since.saturating_duration_since(started),
            }
        };

        loop {
            if stop.is_cancelled() {
                return Ok(());
            }

            let params = FetchParams::long_poll(
                cursor.next_offset(),
                self.config.poll_timeout,
                self.config.allowed_updates.clone(),
            );

            let result = tokio::select! {
                biased;

                _ = stop.cancelled() => return Ok(()),
                result = self.client.fetch_updates(params) => result,
            };

            match result {
                Ok(updates) => {
                    streak = None;
                    if !self.dispatch(updates, cursor, stop).await {
                        return Ok(());
                    }
                }
                Err(err) => {
                    if self.classifier.classify(&err) != FailureClass::RecoverableNetwork {
                        return Err(failure(err, streak));
                    }

                    let current = streak.get_or_insert(FailureStreak {
                        started: Instant::now(),
                        attempts: 0,
                    });
                    current.attempts += 1;
                    let attempts = current.attempts;
                    if current.started.elapsed() >= self.config.retry_window {
                        return Err(failure(err, streak));
                    }

                    let backoff = self.config.retry_backoff.delay(attempts);
                    let delay = err.retry_after.map_or(backoff, |hint| hint.max(backoff));
                    debug!(
                        attempt = attempts,
                        delay = ?delay,
                        error = %err,
                        "Fetch failed, retrying inside runner"
                    );
                    if sleep_or_cancel(delay, stop).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the handler over a batch and advances the cursor in order.
    ///
    /// Returns false if `stop` fired first. Handlers still running at that
    /// point are aborted and their updates are left unacknowledged, so the
    /// feed will deliver them again.
    async fn dispatch<S: OffsetStore>(
        &self,
        mut updates: Vec<Update>,
        cursor: &mut OffsetCursor<S>,
        stop: &CancellationToken,
    ) -> bool {
        updates.sort_by_key(|u| u.update_id);

        let mut tasks: Vec<(UpdateId, JoinHandle<Result<(), String>>)> =
            Vec::with_capacity(updates.len());
        let mut highest = cursor.last();

        for update in updates {
            let id = update.update_id;
            if highest.is_some_and(|h| id <= h) {
                trace!(update_id = %id, "Skipping already processed update");
                continue;
            }
            highest = Some(id);

            let handler = self.handler.clone();
            let permits = self.permits.clone();
            let task = tokio::spawn(async move {
                // Never closed.
                let _permit = permits.acquire_owned().await.ok();
                handler.handle(update).await.map_err(|e| e.to_string())
            });
            tasks.push((id, task));
        }

        let mut pending = tasks.into_iter();
        while let Some((id, task)) = pending.next() {
            let abort = task.abort_handle();
            let joined = tokio::select! {
                biased;

                _ = stop.cancelled() => None,
                joined = task => Some(joined),
            };
            let Some(joined) = joined else {
                abort.abort();
                for (_, rest) in pending {
                    rest.abort();
                }
                return false;
            };

            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(update_id = %id, error = %e, "Update handler failed"),
                Err(e) => error!(update_id = %id, error = %e, "Update handler panicked"),
            }
            cursor.advance(id);
        }

        true
    }
}
