//! File-backed offset store.
//!
//! # File Format
//!
//! One file per account at `<state_dir>/update-offset-<account>.json`:
//!
//! ```json
//! { "version": 1, "last_update_id": 812, "updated_at": "2026-01-02T03:04:05Z" }
//! ```
//!
//! # Atomic Writes
//!
//! 1. Write to a uniquely named temp file in the state directory
//! 2. fsync the file
//! 3. Rename over the real file
//! 4. fsync the directory
//!
//! Readers see either the old or the new offset, never a partial write.
//! Writers in other processes never share a temp file, so concurrent writes
//! resolve as last-writer-wins.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::store::{OffsetStore, OffsetStoreError, Result};
use crate::types::{AccountId, UpdateId};

/// Current file format version.
pub const OFFSET_FILE_VERSION: u32 = 1;

/// On-disk representation of an account's offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetFile {
    pub version: u32,
    pub last_update_id: UpdateId,
    pub updated_at: DateTime<Utc>,
}

/// Stores offsets as small JSON files in a state directory.
#[derive(Debug)]
pub struct FileOffsetStore {
    dir: PathBuf,

    /// Serializes read-compare-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileOffsetStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileOffsetStore {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The state directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the offset file for `account`.
    pub fn path_for(&self, account: &AccountId) -> PathBuf {
        self.dir
            .join(format!("update-offset-{}.json", account.file_stem()))
    }
}

impl OffsetStore for FileOffsetStore {
    fn read(&self, account: &AccountId) -> Result<Option<UpdateId>> {
        Ok(try_load(&self.path_for(account))?.map(|f| f.last_update_id))
    }

    fn write(&self, account: &AccountId, id: UpdateId) -> Result<()> {
        // A poisoned lock only means another writer panicked; the file on
        // disk is still whole thanks to the rename.
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let path = self.path_for(account);
        if let Some(current) = try_load(&path)?
            && current.last_update_id >= id
        {
            trace!(account = %account, current = %current.last_update_id, id = %id, "Offset not advanced");
            return Ok(());
        }

        let file = OffsetFile {
            version: OFFSET_FILE_VERSION,
            last_update_id: id,
            updated_at: Utc::now(),
        };
        save_atomic(&path, &file)
    }
}

/// Loads an offset file, returning `None` if it does not exist.
fn try_load(path: &Path) -> Result<Option<OffsetFile>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let file: OffsetFile = serde_json::from_slice(&bytes)?;
    if file.version != OFFSET_FILE_VERSION {
        return Err(OffsetStoreError::UnsupportedVersion {
            expected: OFFSET_FILE_VERSION,
            got: file.version,
        });
    }
    Ok(Some(file))
}

/// Writes `file` to `path` via temp file, fsync, rename and directory fsync.
fn save_atomic(path: &Path, file: &OffsetFile) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let bytes = serde_json::to_vec(file)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".update-offset-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    // The rename only survives a power loss once the directory entry is synced.
    File::open(dir)?.sync_all()?;

    Ok(())
}
