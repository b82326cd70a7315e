//! Backoff policies for the retry tracks.
//!
//! Three policies are used:
//!
//! - [`BackoffPolicy::NETWORK`]: the slow track for transient outages
//!   (2s, 3.6s, 6.5s, ... capped at 30s, up to 25% jitter)
//! - [`BackoffPolicy::CONFLICT`]: the fast track for re-claiming after a
//!   conflict (500ms, 1s, 1.5s, ... capped at 3s, no jitter)
//! - [`BackoffPolicy::RUNNER`]: the runner's own short retries
//!
//! The conflict track is faster than the network track at every attempt. A
//! newcomer's re-claim therefore lands before a displaced incumbent that
//! treats the conflict as a reason to back off.

use std::time::Duration;

/// How the base delay grows with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Growth {
    /// `initial * factor^(attempt - 1)`
    Exponential { factor: f64 },

    /// `initial * attempt`
    Linear,
}

/// A capped backoff with optional proportional jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Delay for the first attempt.
    pub initial: Duration,

    /// Upper bound for every delay, jitter included.
    pub max: Duration,

    /// Growth of the base delay.
    pub growth: Growth,

    /// Jitter as a fraction of the base delay, in `[0, 1]`.
    pub jitter: f64,
}

impl BackoffPolicy {
    /// Network track: 2s initial, x1.8 per attempt, 30s cap, 25% jitter.
    pub const NETWORK: Self = Self {
        initial: Duration::from_millis(2000),
        max: Duration::from_millis(30_000),
        growth: Growth::Exponential { factor: 1.8 },
        jitter: 0.25,
    };

    /// Conflict track: 500ms per attempt, 3s cap, no jitter.
    pub const CONFLICT: Self = Self {
        initial: Duration::from_millis(500),
        max: Duration::from_millis(3000),
        growth: Growth::Linear,
        jitter: 0.0,
    };

    /// Runner-internal retries: 500ms doubling up to 15s.
    pub const RUNNER: Self = Self {
        initial: Duration::from_millis(500),
        max: Duration::from_secs(15),
        growth: Growth::Exponential { factor: 2.0 },
        jitter: 0.0,
    };

    /// Returns a copy of this policy with jitter disabled.
    pub fn without_jitter(self) -> Self {
        Self {
            jitter: 0.0,
            ..self
        }
    }

    /// Base delay for `attempt`, before jitter. Attempt 0 is treated as 1.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let multiplier = match self.growth {
            Growth::Exponential { factor } => {
                factor.powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32)
            }
            Growth::Linear => attempt as f64,
        };
        self.capped(self.initial.as_secs_f64() * multiplier)
    }

    /// Delay for `attempt` with the jitter sample `u` in `[0, 1)`.
    ///
    /// `u` is clamped, so the result always lies in `[base, max]`.
    pub fn delay_with_sample(&self, attempt: u32, u: f64) -> Duration {
        let base = self.base_delay(attempt);
        let u = if u.is_finite() { u.clamp(0.0, 1.0) } else { 0.0 };
        let jitter = self.jitter.clamp(0.0, 1.0);
        self.capped(base.as_secs_f64() * (1.0 + jitter * u))
    }

    /// Delay for `attempt`, with a fresh random jitter sample.
    pub fn delay(&self, attempt: u32) -> Duration {
        let u = if self.jitter > 0.0 {
            rand::random::<f64>()
        } else {
            0.0
        };
        self.delay_with_sample(attempt, u)
    }

    /// Jitter-free delays for attempts `1..=n`.
    pub fn base_delays(&self, n: u32) -> impl Iterator<Item = Duration> + '_ {
        (1..=n).map(|attempt| self.base_delay(attempt))
    }

    fn capped(&self, secs: f64) -> Duration {
        // f64::min returns the other operand for NaN.
        let secs = secs.min(self.max.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(secs)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::NETWORK
    }
}
