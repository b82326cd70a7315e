//! The offset store trait and its error type.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::types::{AccountId, UpdateId};

/// Errors that can occur while reading or writing offsets.
#[derive(Debug, Error)]
pub enum OffsetStoreError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The offset file was written by an incompatible version.
    #[error("unsupported offset file version: expected {expected}, got {got}")]
    UnsupportedVersion { expected: u32, got: u32 },
}

/// Result type for offset store operations.
pub type Result<T> = std::result::Result<T, OffsetStoreError>;

/// Durable per-account update offsets.
///
/// Implementations must be monotonic: writing an id that is not greater than
/// the stored one leaves the store unchanged and succeeds.
pub trait OffsetStore: Send + Sync {
    /// Returns the last handled update id, or `None` if nothing was stored.
    fn read(&self, account: &AccountId) -> Result<Option<UpdateId>>;

    /// Records `id` as handled if it is greater than the stored id.
    fn write(&self, account: &AccountId, id: UpdateId) -> Result<()>;
}

impl<S: OffsetStore + ?Sized> OffsetStore for Arc<S> {
    fn read(&self, account: &AccountId) -> Result<Option<UpdateId>> {
        (**self).read(account)
    }

    fn write(&self, account: &AccountId, id: UpdateId) -> Result<()> {
        (**self).write(account, id)
    }
}
