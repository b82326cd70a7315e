//! Core domain types for feed ingestion.

pub mod ids;
pub mod update;

pub use ids::{AccountId, SecretToken, UpdateId};
pub use update::{ALLOWED_UPDATES, Update, default_allowed_updates};
