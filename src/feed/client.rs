//! The feed client trait.
//!
//! The ownership engine only needs three calls from the feed. Keeping them
//! behind a trait lets the engine run against the real Bot API in production
//! and against a simulated single-consumer feed in tests.

use std::future::Future;
use std::time::Duration;

use crate::types::{SecretToken, Update, UpdateId};

use super::error::FeedError;

/// Parameters for one update fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchParams {
    /// First update id to return. `None` lets the feed pick.
    pub offset: Option<UpdateId>,

    /// Long-poll timeout. Zero returns immediately, which is what a claim uses.
    pub timeout: Duration,

    /// Update types to request. `None` keeps the feed's current filter.
    pub allowed_updates: Option<Vec<String>>,
}

impl FetchParams {
    /// A zero-timeout fetch used to take over the long-poll.
    pub fn claim(offset: Option<UpdateId>) -> Self {
        FetchParams {
            offset,
            timeout: Duration::ZERO,
            allowed_updates: None,
        }
    }

    /// A long-poll fetch.
    pub fn long_poll(
        offset: Option<UpdateId>,
        timeout: Duration,
        allowed_updates: Vec<String>,
    ) -> Self {
        FetchParams {
            offset,
            timeout,
            allowed_updates: Some(allowed_updates),
        }
    }

    /// Returns true for a claim (zero-timeout) fetch.
    pub fn is_claim(&self) -> bool {
        self.timeout.is_zero()
    }
}

/// Webhook registration request.
#[derive(Debug, Clone)]
pub struct WebhookRegistration {
    /// Public URL the feed should deliver to.
    pub url: String,

    /// Secret the feed echoes back in every delivery.
    pub secret: Option<SecretToken>,

    /// Update types to deliver.
    pub allowed_updates: Vec<String>,
}

/// Remote update feed for one account.
///
/// The feed allows a single active long-poll per account. A new fetch
/// terminates any outstanding one, which then fails with a 409 conflict.
pub trait FeedClient: Send + Sync {
    /// Removes any registered webhook. Succeeds when none is registered.
    fn delete_webhook(&self) -> impl Future<Output = Result<(), FeedError>> + Send;

    /// Fetches pending updates, waiting up to `params.timeout` for new ones.
    fn fetch_updates(
        &self,
        params: FetchParams,
    ) -> impl Future<Output = Result<Vec<Update>, FeedError>> + Send;

    /// Registers a webhook for push delivery.
    fn set_webhook(
        &self,
        registration: WebhookRegistration,
    ) -> impl Future<Output = Result<(), FeedError>> + Send;
}
