//! Retry timing: backoff policies and cancellable sleeps.

pub mod backoff;
pub mod sleep;

pub use backoff::{BackoffPolicy, Growth};
pub use sleep::{Cancelled, sleep_or_cancel};
