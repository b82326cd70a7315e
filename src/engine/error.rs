//! Engine errors.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::feed::FeedError;
use crate::offset::OffsetStoreError;
use crate::webhook::ServeError;

/// Errors that stop the engine.
///
/// Conflicts and network failures never appear here; they are retried.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The account is not usable as configured.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The persisted offset could not be read.
    #[error("offset store error: {0}")]
    OffsetStore(#[from] OffsetStoreError),

    /// The feed returned a non-retriable error.
    #[error("fatal feed error: {0}")]
    Feed(#[from] FeedError),

    /// The webhook listener could not bind.
    #[error("failed to bind webhook listener on {addr}: {source}")]
    WebhookBind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The feed refused the webhook registration.
    #[error("webhook registration failed: {0}")]
    WebhookRegistration(#[source] FeedError),

    /// The webhook server failed after starting.
    #[error("webhook server error: {0}")]
    WebhookServe(#[source] io::Error),
}

impl From<ServeError> for EngineError {
    fn from(err: ServeError) -> Self {
        match err {
            ServeError::Registration(e) => EngineError::WebhookRegistration(e),
            ServeError::Bind { addr, source } => EngineError::WebhookBind { addr, source },
            ServeError::Io(e) => EngineError::WebhookServe(e),
        }
    }
}
