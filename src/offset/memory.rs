//! In-memory offset store.

use std::collections::HashMap;
use std::sync::Mutex;

use super::store::{OffsetStore, Result};
use crate::types::{AccountId, UpdateId};

/// Keeps offsets in a map. Share it through an `Arc` to let several engines
/// see the same offsets, as processes sharing a state directory would.
#[derive(Debug, Default)]
pub struct MemoryOffsetStore {
    offsets: Mutex<HashMap<AccountId, UpdateId>>,
}

impl MemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `id` for `account`.
    pub fn with_offset(account: AccountId, id: UpdateId) -> Self {
        MemoryOffsetStore {
            offsets: Mutex::new(HashMap::from([(account, id)])),
        }
    }
}

impl OffsetStore for MemoryOffsetStore {
    fn read(&self, account: &AccountId) -> Result<Option<UpdateId>> {
        let offsets = self.offsets.lock().unwrap_or_else(|p| p.into_inner());
        Ok(offsets.get(account).copied())
    }

    fn write(&self, account: &AccountId, id: UpdateId) -> Result<()> {
        let mut offsets = self.offsets.lock().unwrap_or_else(|p| p.into_inner());
        let entry = offsets.entry(account.clone()).or_insert(id);
        if id > *entry {
            *entry = id;
        }
        Ok(())
    }
}
