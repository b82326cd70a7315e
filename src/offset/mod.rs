//! Per-account update offsets.
//!
//! The offset is the last update id that was handled. It is read once at
//! engine start, advanced after each handled update, and never moves
//! backwards. Two processes sharing a state directory may both write it;
//! the monotonic rule makes the order of those writes irrelevant.

pub mod cursor;
pub mod file;
pub mod memory;
pub mod store;

pub use cursor::OffsetCursor;
pub use file::{FileOffsetStore, OFFSET_FILE_VERSION, OffsetFile};
pub use memory::MemoryOffsetStore;
pub use store::{OffsetStore, OffsetStoreError};
