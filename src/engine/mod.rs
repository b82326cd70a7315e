//! Update ownership: claiming the feed and keeping it.
//!
//! # Module Structure
//!
//! - [`engine`]: the [`OwnershipEngine`] state machine
//! - [`config`]: timing and policy knobs
//! - [`state`]: [`RunState`] and the published [`EnginePhase`]
//! - [`error`]: [`EngineError`]

pub mod config;
#[allow(clippy::module_inception)]
pub mod engine;
pub mod error;
pub mod state;


pub use config::EngineConfig;
pub use engine::OwnershipEngine;
pub use error::EngineError;
pub use state::{EnginePhase, RetryPlan, RetryTrack, RunState};
