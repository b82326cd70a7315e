//! Engine tuning.

use std::time::Duration;

use crate::feed::Classifier;
use crate::retry::BackoffPolicy;
use crate::runner::RunnerConfig;

/// Timing and policy knobs for [`OwnershipEngine`](super::OwnershipEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pause after a successful startup claim, letting the displaced
    /// consumer's long-poll fail before ours starts.
    pub claim_grace: Duration,

    /// Pause after a conflict re-claim before polling again.
    pub reclaim_settle: Duration,

    /// Backoff for network failures, and for yielding after a conflict.
    pub network_backoff: BackoffPolicy,

    /// Backoff before a conflict re-claim.
    pub conflict_backoff: BackoffPolicy,

    /// A conflict is contested only if our last claim is at most this old.
    pub contention_window: Duration,

    /// Conflict attempts that may re-claim before the engine yields.
    pub max_contended_reclaims: u32,

    /// A runner period at least this long resets both attempt counters.
    pub stable_run_after: Duration,

    /// Settings passed to the polling runner.
    pub runner: RunnerConfig,

    /// Sorts runner failures into conflict, network and fatal.
    pub classifier: Classifier,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            claim_grace: Duration::from_millis(2000),
            reclaim_settle: Duration::from_millis(500),
            network_backoff: BackoffPolicy::NETWORK,
            conflict_backoff: BackoffPolicy::CONFLICT,
            contention_window: Duration::from_secs(60),
            max_contended_reclaims: 5,
            stable_run_after: Duration::from_secs(10),
            runner: RunnerConfig::default(),
            classifier: Classifier::default(),
        }
    }
}

impl EngineConfig {
    /// Sets the handler concurrency.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.runner = self.runner.with_concurrency(concurrency);
        self
    }
}
