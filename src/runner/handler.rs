//! The update handler seam.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;

use tracing::info;

use crate::types::Update;

/// Processes one update.
///
/// Handlers run concurrently (bounded by the runner's concurrency) and must
/// not assume ordering between updates. A returned error is logged; the
/// update still counts as handled.
pub trait UpdateHandler: Send + Sync + 'static {
    /// The error type returned by this handler.
    type Error: fmt::Display + Send + 'static;

    /// Handles `update`.
    fn handle(&self, update: Update) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Logs each update's id and type.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogUpdateHandler;

impl UpdateHandler for LogUpdateHandler {
    type Error = Infallible;

    async fn handle(&self, update: Update) -> Result<(), Self::Error> {
        info!(
            update_id = %update.update_id,
            kind = update.kind().unwrap_or("unknown"),
            "Received update"
        );
        Ok(())
    }
}
