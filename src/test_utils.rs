//! Shared test utilities: a simulated feed and recording handlers.
//!
//! [`SimulatedFeed`] models the one property of the real feed the engine
//! depends on: a single active long-poll per account. Any new fetch
//! terminates the outstanding long-poll, which then fails with the same 409
//! the real feed returns.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;

use crate::feed::{FeedClient, FeedError, FetchParams, TransportFailure, WebhookRegistration};
use crate::runner::UpdateHandler;
use crate::types::{Update, UpdateId};

/// The description the feed sends with a fetch conflict.
pub const CONFLICT_DESCRIPTION: &str =
    "Conflict: terminated by other getUpdates request; make sure that only one bot instance is running";

/// A 409 fetch conflict as the feed reports it.
pub fn conflict_error() -> FeedError {
    FeedError::api("getUpdates", 409, CONFLICT_DESCRIPTION)
}

/// A fetch timeout as the HTTP stack reports it.
pub fn timeout_error() -> FeedError {
    FeedError::transport("getUpdates", TransportFailure::Timeout, "operation timed out")
}

/// One fetch seen by the feed.
#[derive(Debug, Clone)]
pub struct FetchRecord {
    pub client: String,
    pub params: FetchParams,
    pub at: tokio::time::Instant,
}

#[derive(Debug, Default)]
struct FeedState {
    pending: Vec<Update>,
    active_poll: Option<(u64, String)>,
    next_ticket: u64,
    webhook: Option<String>,
    delete_webhook_calls: u32,
    fetches: Vec<FetchRecord>,
}

/// A simulated single-consumer update feed.
#[derive(Clone)]
pub struct SimulatedFeed {
    state: Arc<Mutex<FeedState>>,
    changed: Arc<watch::Sender<u64>>,
}

impl Default for SimulatedFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedFeed {
    pub fn new() -> Self {
        let (changed, _) = watch::channel(0);
        SimulatedFeed {
            state: Arc::new(Mutex::new(FeedState::default())),
            changed: Arc::new(changed),
        }
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap()
    }

    fn notify(&self) {
        self.changed.send_modify(|v| *v += 1);
    }

    /// Creates a client identified as `name`.
    pub fn client(&self, name: &str) -> SimulatedClient {
        SimulatedClient {
            feed: self.clone(),
            name: name.to_string(),
            poll_failures: Arc::new(Mutex::new(VecDeque::new())),
            claim_failures: Arc::new(Mutex::new(VecDeque::new())),
            delete_failure: Arc::new(Mutex::new(None)),
            webhook_failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Queues updates with the given ids and a small message payload.
    pub fn push_ids(&self, ids: impl IntoIterator<Item = i64>) {
        {
            let mut state = self.state();
            for id in ids {
                state.pending.push(
                    Update::new(id).with_field("message", serde_json::json!({ "text": id.to_string() })),
                );
            }
        }
        self.notify();
    }

    /// Name of the client currently holding the long-poll, if any.
    pub fn active_poller(&self) -> Option<String> {
        self.state().active_poll.as_ref().map(|(_, name)| name.clone())
    }

    /// The registered webhook URL.
    pub fn webhook(&self) -> Option<String> {
        self.state().webhook.clone()
    }

    /// Registers a webhook directly, as another deployment might.
    pub fn register_webhook(&self, url: &str) {
        self.state().webhook = Some(url.to_string());
    }

    pub fn delete_webhook_calls(&self) -> u32 {
        self.state().delete_webhook_calls
    }

    /// All fetches in arrival order.
    pub fn fetches(&self) -> Vec<FetchRecord> {
        self.state().fetches.clone()
    }

    /// Fetches made by `client`.
    pub fn fetches_by(&self, client: &str) -> Vec<FetchRecord> {
        self.fetches()
            .into_iter()
            .filter(|f| f.client == client)
            .collect()
    }
}

/// One consumer's connection to a [`SimulatedFeed`].
#[derive(Clone)]
pub struct SimulatedClient {
    feed: SimulatedFeed,
    name: String,
    poll_failures: Arc<Mutex<VecDeque<FeedError>>>,
    claim_failures: Arc<Mutex<VecDeque<FeedError>>>,
    delete_failure: Arc<Mutex<Option<FeedError>>>,
    webhook_failure: Arc<Mutex<Option<FeedError>>>,
}

impl SimulatedClient {
    /// Makes the next long-poll fetches fail with the errors produced by
    /// `make`, `n` times. Claims are not affected.
    pub fn fail_polls(&self, n: usize, make: impl Fn() -> FeedError) {
        let mut failures = self.poll_failures.lock().unwrap();
        for _ in 0..n {
            failures.push_back(make());
        }
    }

    /// Makes the next `n` claim fetches fail with the errors produced by
    /// `make`. A failed claim displaces nobody.
    pub fn fail_claims(&self, n: usize, make: impl Fn() -> FeedError) {
        let mut failures = self.claim_failures.lock().unwrap();
        for _ in 0..n {
            failures.push_back(make());
        }
    }

    /// Makes the next `delete_webhook` call fail with `err`. The webhook,
    /// if any, stays registered.
    pub fn fail_delete_webhook(&self, err: FeedError) {
        *self.delete_failure.lock().unwrap() = Some(err);
    }

    /// Makes the next `set_webhook` call fail with `err`.
    pub fn fail_set_webhook(&self, err: FeedError) {
        *self.webhook_failure.lock().unwrap() = Some(err);
    }
}

impl FeedClient for SimulatedClient {
    async fn delete_webhook(&self) -> Result<(), FeedError> {
        if let Some(err) = self.delete_failure.lock().unwrap().take() {
            return Err(err);
        }
        let mut state = self.feed.state();
        state.delete_webhook_calls += 1;
        state.webhook = None;
        Ok(())
    }

    async fn fetch_updates(&self, params: FetchParams) -> Result<Vec<Update>, FeedError> {
        let mut changed = self.feed.changed.subscribe();
        let is_claim = params.is_claim();
        let timeout = params.timeout;

        let ticket = {
            let mut state = self.feed.state();
            state.fetches.push(FetchRecord {
                client: self.name.clone(),
                params: params.clone(),
                at: tokio::time::Instant::now(),
            });

            let failures = if is_claim {
                &self.claim_failures
            } else {
                &self.poll_failures
            };
            if let Some(err) = failures.lock().unwrap().pop_front() {
                return Err(err);
            }

            if state.webhook.is_some() {
                return Err(FeedError::api(
                    "getUpdates",
                    409,
                    "Conflict: can't use getUpdates method while webhook is active; use deleteWebhook to delete the webhook first",
                ));
            }

            if let Some(offset) = params.offset {
                state.pending.retain(|u| u.update_id >= offset);
            }

            state.next_ticket += 1;
            let ticket = state.next_ticket;
            state.active_poll = Some((ticket, self.name.clone()));

            if is_claim || !state.pending.is_empty() {
                state.active_poll = None;
                let batch = state.pending.clone();
                drop(state);
                self.feed.notify();
                return Ok(batch);
            }
            ticket
        };
        self.feed.notify();

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            {
                let mut state = self.feed.state();
                if state.active_poll.as_ref().map(|(t, _)| *t) != Some(ticket) {
                    return Err(conflict_error());
                }
                if !state.pending.is_empty() {
                    state.active_poll = None;
                    return Ok(state.pending.clone());
                }
            }

            tokio::select! {
                _ = &mut deadline => {
                    let mut state = self.feed.state();
                    if state.active_poll.as_ref().map(|(t, _)| *t) == Some(ticket) {
                        state.active_poll = None;
                        return Ok(Vec::new());
                    }
                    return Err(conflict_error());
                }
                res = changed.changed() => {
                    if res.is_err() {
                        return Ok(Vec::new());
                    }
                }
            }
        }
    }

    async fn set_webhook(&self, registration: WebhookRegistration) -> Result<(), FeedError> {
        if let Some(err) = self.webhook_failure.lock().unwrap().take() {
            return Err(err);
        }
        self.feed.state().webhook = Some(registration.url);
        self.feed.notify();
        Ok(())
    }
}

/// What a [`RecordingHandler`] does with a given update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Succeed,
    Fail,
    Panic,
}

/// Records handled update ids and tracks peak concurrency.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    handled: Arc<Mutex<Vec<UpdateId>>>,
    reactions: Arc<Mutex<Vec<(UpdateId, Reaction)>>>,
    delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every handler call take `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sets how the handler reacts to update `id`.
    pub fn react(&self, id: i64, reaction: Reaction) {
        self.reactions.lock().unwrap().push((UpdateId(id), reaction));
    }

    /// Ids handled so far, in completion order. Panicking calls are excluded.
    pub fn handled(&self) -> Vec<UpdateId> {
        self.handled.lock().unwrap().clone()
    }

    /// Ids handled so far, sorted.
    pub fn handled_sorted(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.handled().into_iter().map(|id| id.0).collect();
        ids.sort_unstable();
        ids
    }

    /// The largest number of handler calls that overlapped.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl UpdateHandler for RecordingHandler {
    type Error = String;

    async fn handle(&self, update: Update) -> Result<(), Self::Error> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let id = update.update_id;
        let reaction = self
            .reactions
            .lock()
            .unwrap()
            .iter()
            .find(|(rid, _)| *rid == id)
            .map(|(_, r)| *r)
            .unwrap_or(Reaction::Succeed);

        match reaction {
            Reaction::Panic => panic!("handler panicked on update {}", id),
            Reaction::Fail => {
                self.handled.lock().unwrap().push(id);
                Err(format!("cannot handle update {}", id))
            }
            Reaction::Succeed => {
                self.handled.lock().unwrap().push(id);
                Ok(())
            }
        }
    }
}
