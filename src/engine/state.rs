//! Engine run state and observable phases.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::FeedMode;
use crate::types::UpdateId;

/// Mutable state owned by one engine loop.
///
/// Returned to the caller when the engine stops.
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub mode: FeedMode,

    /// The last handled update id.
    pub last_update_id: Option<UpdateId>,

    /// Consecutive network-track restarts.
    pub restart_attempts: u32,

    /// Consecutive conflicts.
    pub conflict_attempts: u32,

    /// Set once cancellation has been observed.
    pub abort_requested: bool,

    /// When this engine last claimed the feed.
    pub(crate) claimed_at: Option<Instant>,
}

impl RunState {
    pub fn new(mode: FeedMode) -> Self {
        RunState {
            mode,
            last_update_id: None,
            restart_attempts: 0,
            conflict_attempts: 0,
            abort_requested: false,
            claimed_at: None,
        }
    }

    /// When this engine last claimed the feed.
    pub fn last_claim(&self) -> Option<Instant> {
        self.claimed_at
    }

    /// Marks a successful claim at `now`.
    pub(crate) fn record_claim(&mut self, now: Instant) {
        self.claimed_at = Some(now);
    }

    /// Clears both attempt counters after a stable run.
    pub(crate) fn reset_attempts(&mut self) {
        self.restart_attempts = 0;
        self.conflict_attempts = 0;
    }
}

/// Which retry track a failure was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryTrack {
    Conflict,
    Network,
}

impl fmt::Display for RetryTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryTrack::Conflict => f.write_str("conflict"),
            RetryTrack::Network => f.write_str("network"),
        }
    }
}

/// A scheduled retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPlan {
    pub track: RetryTrack,

    /// The attempt number on this track, starting at 1.
    pub attempt: u32,

    /// How long the engine waits before acting.
    pub delay: Duration,

    /// Whether the engine re-claims after waiting (contending) or just
    /// resumes polling (yielding or network).
    pub reclaim: bool,
}

/// What the engine is doing, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Claiming,
    Running,
    Retrying(RetryPlan),
    Webhook,
    Stopped,
}

impl EnginePhase {
    pub fn is_running(&self) -> bool {
        matches!(self, EnginePhase::Running)
    }

    /// The retry plan, if the engine is waiting to retry.
    pub fn retry(&self) -> Option<RetryPlan> {
        match self {
            EnginePhase::Retrying(plan) => Some(*plan),
            _ => None,
        }
    }
}
