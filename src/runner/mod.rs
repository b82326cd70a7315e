//! The polling runner and the handler it drives.

pub mod handler;
#[allow(clippy::module_inception)]
pub mod runner;


pub use handler::{LogUpdateHandler, UpdateHandler};
pub use runner::{DEFAULT_CONCURRENCY, PollRunner, RunFailure, RunnerConfig};
