//! Failure classification for feed errors.
//!
//! Every runner failure is sorted into one of three classes, and the class
//! alone decides what the ownership engine does next:
//!
//! - **Conflict**: another consumer holds the long-poll for this account.
//!   Handled on the conflict track (re-claim or yield).
//! - **RecoverableNetwork**: a transient outage. Handled on the network track.
//! - **Fatal**: credentials, permanent 4xx, malformed responses. Propagated,
//!   never retried.
//!
//! Classification is pure so it can be exercised against synthetic errors.

use super::error::{FeedError, TransportFailure};

/// The update-fetch method. Only a 409 attributed to it is a conflict.
pub const FETCH_METHOD: &str = "getUpdates";

/// HTTP status the feed uses for an exclusivity violation.
const CONFLICT_CODE: u16 = 409;

/// Outcome of classifying a feed error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Another consumer is polling the same account.
    Conflict,

    /// Transient failure, safe to retry with backoff.
    RecoverableNetwork,

    /// Not retriable.
    Fatal,
}

impl FailureClass {
    /// Short label used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Conflict => "conflict",
            FailureClass::RecoverableNetwork => "network",
            FailureClass::Fatal => "fatal",
        }
    }

    /// Returns true unless the class is `Fatal`.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, FailureClass::Fatal)
    }
}

/// Predicate deciding whether an error is a transient network failure.
pub type NetworkPredicate = fn(&FeedError) -> bool;

/// A classifier with a pluggable network-error predicate.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    is_recoverable: NetworkPredicate,
}

impl Classifier {
    /// Creates a classifier that uses `is_recoverable` for the network check.
    pub fn new(is_recoverable: NetworkPredicate) -> Self {
        Classifier { is_recoverable }
    }

    /// Classifies an error.
    pub fn classify(&self, err: &FeedError) -> FailureClass {
        classify_with(err, self.is_recoverable)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier::new(is_recoverable_network_error)
    }
}

/// Classifies an error with the default network predicate.
pub fn classify(err: &FeedError) -> FailureClass {
    classify_with(err, is_recoverable_network_error)
}

/// Classifies an error with a caller-supplied network predicate.
///
/// The conflict check runs first: a fetch conflict is never reported as a
/// network failure even if the predicate would accept it.
pub fn classify_with(err: &FeedError, is_recoverable: impl Fn(&FeedError) -> bool) -> FailureClass {
    if is_fetch_conflict(err) {
        FailureClass::Conflict
    } else if is_recoverable(err) {
        FailureClass::RecoverableNetwork
    } else {
        FailureClass::Fatal
    }
}

/// Returns true if the error is a 409 raised by the update-fetch method.
///
/// The method field is authoritative when present. The description is only
/// consulted when the transport left the method empty, so a 409 from another
/// method never counts even if its description mentions the fetch method.
pub fn is_fetch_conflict(err: &FeedError) -> bool {
    if err.error_code != Some(CONFLICT_CODE) {
        return false;
    }

    let needle = FETCH_METHOD.to_lowercase();
    match err.method.as_deref() {
        Some(method) => method.to_lowercase().contains(&needle),
        None => err.description.to_lowercase().contains(&needle),
    }
}

/// Default network predicate for polling.
///
/// Accepts:
/// - any transport failure except an undecodable body
/// - HTTP 5xx and 429
/// - descriptions matching common network error phrases
pub fn is_recoverable_network_error(err: &FeedError) -> bool {
    match err.transport {
        Some(TransportFailure::Body) => {}
        Some(_) => return true,
        None => {}
    }

    match err.error_code {
        Some(429) => return true,
        Some(code) if (500..600).contains(&code) => return true,
        Some(_) => return false,
        None => {}
    }

    is_network_message(&err.description)
}

/// Checks if a message indicates a network-level error.
fn is_network_message(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    const PATTERNS: &[&str] = &[
        "timeout",
        "timed out",
        "connection reset",
        "connection refused",
        "connection closed",
        "econnreset",
        "econnrefused",
        "etimedout",
        "enotfound",
        "eai_again",
        "socket hang up",
        "network",
        "dns",
        "temporarily unavailable",
    ];
    PATTERNS.iter().any(|p| message_lower.contains(p))
}
