//! The in-memory offset cursor for one engine.

use std::sync::Arc;

use tracing::warn;

use super::store::{OffsetStore, Result};
use crate::types::{AccountId, UpdateId};

/// Tracks the last handled update id and persists it through a store.
///
/// The cursor only moves forward. It is the dedup filter for fetched updates
/// and the resume point for the next fetch.
#[derive(Debug)]
pub struct OffsetCursor<S> {
    account: AccountId,
    store: Arc<S>,
    last: Option<UpdateId>,
}

impl<S: OffsetStore> OffsetCursor<S> {
    /// Reads the persisted offset for `account`.
    pub fn load(account: AccountId, store: Arc<S>) -> Result<Self> {
        let last = store.read(&account)?;
        Ok(OffsetCursor {
            account,
            store,
            last,
        })
    }

    /// The account this cursor belongs to.
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// The last handled update id.
    pub fn last(&self) -> Option<UpdateId> {
        self.last
    }

    /// The offset to request on the next fetch.
    pub fn next_offset(&self) -> Option<UpdateId> {
        self.last.map(UpdateId::next)
    }

    /// Returns true if `id` is at or below the last handled id.
    pub fn is_processed(&self, id: UpdateId) -> bool {
        self.last.is_some_and(|last| id <= last)
    }

    /// Marks `id` as handled. Returns false if `id` was already covered.
    ///
    /// A failed store write is logged and otherwise ignored: the in-memory
    /// cursor still advances so the feed keeps moving, and the next successful
    /// write catches the file up.
    pub fn advance(&mut self, id: UpdateId) -> bool {
        if self.is_processed(id) {
            return false;
        }
        self.last = Some(id);

        if let Err(e) = self.store.write(&self.account, id) {
            warn!(account = %self.account, update_id = %id, error = %e, "Failed to persist update offset");
        }
        true
    }
}
