//! Cancellable sleeps.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// The sleep was interrupted by cancellation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("sleep cancelled")]
pub struct Cancelled;

/// Sleeps for `delay` unless `cancel` fires first.
///
/// Returns immediately if the token is already cancelled. The timer is
/// dropped with the losing branch, so nothing stays scheduled after an abort.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }

    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
