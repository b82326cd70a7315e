//! Access to the remote update feed.
//!
//! - [`client`]: the [`FeedClient`] trait the engine is written against
//! - [`bot_api`]: the HTTPS implementation
//! - [`error`]: [`FeedError`], the one error type every feed call returns
//! - [`classify`]: sorting errors into conflict, network and fatal classes

pub mod bot_api;
pub mod classify;
pub mod client;
pub mod error;

pub use bot_api::{BotApiClient, decode_response};
pub use classify::{
    Classifier, FETCH_METHOD, FailureClass, classify, classify_with, is_fetch_conflict,
    is_recoverable_network_error,
};
pub use client::{FeedClient, FetchParams, WebhookRegistration};
pub use error::{FeedError, TransportFailure};
