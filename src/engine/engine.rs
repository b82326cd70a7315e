//! The ownership engine.
//!
//! One engine runs per account per process. In polling mode it claims the
//! feed, supervises the runner, and routes every runner failure to a retry
//! track by its class:
//!
//! ```text
//! Idle → Claiming → Running ⇄ Retrying(conflict | network) → Stopped
//! ```
//!
//! # Convergence
//!
//! The feed allows one long-poll per account, and a new fetch knocks out the
//! current one. Two engines that both re-claimed on every conflict would
//! displace each other forever, so the conflict track has two roles:
//!
//! - **Contending**: the engine claimed within the contention window and has
//!   not used up its re-claims. It waits on the fast conflict backoff,
//!   re-claims, and resumes polling.
//! - **Yielding**: any other conflict. The engine waits on the slow network
//!   backoff without re-claiming, then resumes polling so it takes the feed
//!   back if the other consumer has gone away.
//!
//! A fresh engine is always contending, so a newcomer displaces an
//! established owner. Two fresh engines fight for a bounded number of rounds
//! before one of them yields.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{Account, ConfigError, FeedMode};
use crate::feed::{FailureClass, FeedClient, FeedError, FetchParams};
use crate::offset::{OffsetCursor, OffsetStore};
use crate::retry::{Cancelled, sleep_or_cancel};
use crate::runner::{PollRunner, UpdateHandler};
use crate::webhook;

use super::config::EngineConfig;
use super::error::EngineError;
use super::state::{EnginePhase, RetryPlan, RetryTrack, RunState};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Owns update ingestion for one account.
pub struct OwnershipEngine<C, S, H> {
    account: Account,
    client: C,
    store: Arc<S>,
    handler: Arc<H>,
    config: EngineConfig,
    cancel: CancellationToken,
    phase: watch::Sender<EnginePhase>,
}

impl<C, S, H> OwnershipEngine<C, S, H>
where
    C: FeedClient,
    S: OffsetStore + 'static,
    H: UpdateHandler,
{
    pub fn new(
        account: Account,
        client: C,
        store: Arc<S>,
        handler: Arc<H>,
        config: EngineConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (phase, _) = watch::channel(EnginePhase::Idle);
        OwnershipEngine {
            account,
            client,
            store,
            handler,
            config,
            cancel,
            phase,
        }
    }

    /// Subscribes to phase changes.
    pub fn subscribe(&self) -> watch::Receiver<EnginePhase> {
        self.phase.subscribe()
    }

    /// Runs until cancelled or a fatal error occurs.
    ///
    /// Returns the final run state when stopped by cancellation.
    #[instrument(skip(self), fields(account = %self.account.id))]
    pub async fn run(self) -> Result<RunState> {
        let mut state = RunState::new(self.account.mode());

        let result = if self.account.token.is_none() {
            Err(ConfigError::MissingToken {
                account: self.account.id.clone(),
            }
            .into())
        } else {
            info!(mode = %state.mode, "Starting update ingestion");
            match state.mode {
                FeedMode::Webhook => self.run_webhook(&mut state).await,
                FeedMode::Polling => self.run_polling(&mut state).await,
            }
        };

        state.abort_requested = self.cancel.is_cancelled();
        self.set_phase(EnginePhase::Stopped);

        match &result {
            Ok(()) => info!(
                last_update_id = ?state.last_update_id,
                "Update ingestion stopped"
            ),
            Err(e) => error!(error = %e, "Update ingestion failed"),
        }
        result.map(|()| state)
    }

    fn set_phase(&self, phase: EnginePhase) {
        self.phase.send_replace(phase);
    }

    /// Races `fut` against cancellation.
    async fn cancellable<F: Future>(&self, fut: F) -> std::result::Result<F::Output, Cancelled> {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Err(Cancelled),
            out = fut => Ok(out),
        }
    }

    // ─── Webhook mode ────────────────────────────────────────────────────────

    async fn run_webhook(&self, state: &mut RunState) -> Result<()> {
        let Some(settings) = self.account.webhook.as_ref() else {
            return Ok(());
        };

        let cursor = OffsetCursor::load(self.account.id.clone(), self.store.clone())?;
        state.last_update_id = cursor.last();
        self.set_phase(EnginePhase::Webhook);

        webhook::serve(
            &self.client,
            settings,
            cursor,
            self.handler.clone(),
            self.config.runner.allowed_updates.clone(),
            self.cancel.clone(),
        )
        .await?;

        // The webhook cursor is not handed back; re-read what it persisted.
        state.last_update_id = self.store.read(&self.account.id)?;
        Ok(())
    }

    // ─── Polling mode ────────────────────────────────────────────────────────

    async fn run_polling(&self, state: &mut RunState) -> Result<()> {
        let mut cursor = OffsetCursor::load(self.account.id.clone(), self.store.clone())?;
        state.last_update_id = cursor.last();

        if self.claim(state, &cursor).await.is_err() {
            return Ok(());
        }

        let runner = PollRunner::new(
            &self.client,
            self.handler.clone(),
            &self.config.runner,
            self.config.classifier,
        );

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            self.set_phase(EnginePhase::Running);
            let stop = self.cancel.child_token();
            let result = runner.run_reporting(&mut cursor, &stop).await;
            state.last_update_id = cursor.last();

            let failure = match result {
                Ok(()) => return Ok(()),
                Err(failure) => failure,
            };
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            if failure.healthy_for >= self.config.stable_run_after {
                state.reset_attempts();
            }
            let err = failure.error;

            let retried = match self.config.classifier.classify(&err) {
                FailureClass::Fatal => return Err(EngineError::Feed(err)),
                FailureClass::Conflict => self.retry_conflict(state, &cursor, &err).await,
                FailureClass::RecoverableNetwork => self.retry_network(state, &err).await,
            };
            if retried.is_err() {
                return Ok(());
            }
        }
    }

    /// Startup claim: drop any webhook, take over the long-poll, then give
    /// the displaced consumer time to notice.
    ///
    /// Failures are logged and otherwise ignored; the runner surfaces any
    /// lasting problem. Only cancellation ends the claim early.
    async fn claim(
        &self,
        state: &mut RunState,
        cursor: &OffsetCursor<S>,
    ) -> std::result::Result<(), Cancelled> {
        self.set_phase(EnginePhase::Claiming);
        state.record_claim(Instant::now());

        if let Err(e) = self.cancellable(self.client.delete_webhook()).await? {
            warn!(error = %e, "Failed to delete webhook, claiming anyway");
        }

        let claim = FetchParams::claim(cursor.next_offset());
        match self.cancellable(self.client.fetch_updates(claim)).await? {
            Ok(_) => {
                debug!(grace = ?self.config.claim_grace, "Claimed update feed");
                sleep_or_cancel(self.config.claim_grace, &self.cancel).await?;
            }
            Err(e) => warn!(error = %e, "Claim fetch failed, starting runner anyway"),
        }
        Ok(())
    }

    /// Conflict track: contend with a fast re-claim, or yield.
    async fn retry_conflict(
        &self,
        state: &mut RunState,
        cursor: &OffsetCursor<S>,
        err: &FeedError,
    ) -> std::result::Result<(), Cancelled> {
        state.conflict_attempts += 1;
        let attempt = state.conflict_attempts;

        let recently_claimed = state
            .last_claim()
            .is_some_and(|at| at.elapsed() <= self.config.contention_window);
        let contending = recently_claimed && attempt <= self.config.max_contended_reclaims;

        if !contending {
            let delay = self.config.network_backoff.delay(attempt);
            self.set_phase(EnginePhase::Retrying(RetryPlan {
                track: RetryTrack::Conflict,
                attempt,
                delay,
                reclaim: false,
            }));
            warn!(
                class = "conflict",
                attempt,
                delay = ?delay,
                error = %err,
                "Another instance holds the update feed, yielding"
            );
            return sleep_or_cancel(delay, &self.cancel).await;
        }

        let delay = self.config.conflict_backoff.delay(attempt);
        self.set_phase(EnginePhase::Retrying(RetryPlan {
            track: RetryTrack::Conflict,
            attempt,
            delay,
            reclaim: true,
        }));
        warn!(
            class = "conflict",
            attempt,
            delay = ?delay,
            error = %err,
            "Update feed taken by another consumer, re-claiming"
        );
        sleep_or_cancel(delay, &self.cancel).await?;

        let claim = FetchParams::claim(cursor.next_offset());
        match self.cancellable(self.client.fetch_updates(claim)).await? {
            Ok(_) => {
                state.record_claim(Instant::now());
                debug!(attempt, "Re-claimed update feed");
            }
            Err(e) => debug!(attempt, error = %e, "Re-claim failed"),
        }

        sleep_or_cancel(self.config.reclaim_settle, &self.cancel).await
    }

    /// Network track: wait and restart the runner.
    async fn retry_network(
        &self,
        state: &mut RunState,
        err: &FeedError,
    ) -> std::result::Result<(), Cancelled> {
        state.restart_attempts += 1;
        let attempt = state.restart_attempts;
        let delay = self.config.network_backoff.delay(attempt);

        self.set_phase(EnginePhase::Retrying(RetryPlan {
            track: RetryTrack::Network,
            attempt,
            delay,
            reclaim: false,
        }));
        warn!(
            class = "network",
            attempt,
            delay = ?delay,
            error = %err,
            "Update feed unreachable, restarting runner"
        );
        sleep_or_cancel(delay, &self.cancel).await
    }
}
