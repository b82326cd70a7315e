//! Feed API error type.
//!
//! A [`FeedError`] carries every field the failure classifier looks at:
//!
//! - the API method that failed (`getUpdates`, `deleteWebhook`, ...)
//! - the structured error code (HTTP status or the envelope's `error_code`)
//! - the human-readable description
//! - the transport failure kind, when the request never produced a response
//!
//! Some transports populate only the method or only the description, so none
//! of these fields is mandatory.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Why a request failed before the feed produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// The request or the connection timed out.
    Timeout,

    /// The connection could not be established (refused, unreachable, TLS).
    Connect,

    /// The connection was reset or closed mid-request.
    ConnectionReset,

    /// Host name resolution failed.
    Dns,

    /// The response body could not be read or decoded.
    Body,

    /// Anything else reported by the HTTP stack.
    Other,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportFailure::Timeout => "timeout",
            TransportFailure::Connect => "connect",
            TransportFailure::ConnectionReset => "connection reset",
            TransportFailure::Dns => "dns",
            TransportFailure::Body => "body",
            TransportFailure::Other => "transport",
        };
        f.write_str(s)
    }
}

/// A failed feed API call.
#[derive(Debug, Error)]
pub struct FeedError {
    /// The API method that failed, if known.
    pub method: Option<String>,

    /// Structured error code (HTTP status or envelope `error_code`).
    pub error_code: Option<u16>,

    /// Human-readable description of the failure.
    pub description: String,

    /// Set when the failure happened below the API layer.
    pub transport: Option<TransportFailure>,

    /// Server-provided hint for how long to wait before retrying.
    pub retry_after: Option<Duration>,

    /// The underlying HTTP client error, if any.
    #[source]
    pub source: Option<reqwest::Error>,
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = self.method.as_deref().unwrap_or("feed request");
        match (self.error_code, self.transport) {
            (Some(code), _) => write!(f, "{} failed ({}): {}", method, code, self.description),
            (None, Some(kind)) => write!(f, "{} failed ({}): {}", method, kind, self.description),
            (None, None) => write!(f, "{} failed: {}", method, self.description),
        }
    }
}

impl FeedError {
    /// An error reported by the feed API itself.
    pub fn api(method: impl Into<String>, error_code: u16, description: impl Into<String>) -> Self {
        FeedError {
            method: Some(method.into()),
            error_code: Some(error_code),
            description: description.into(),
            transport: None,
            retry_after: None,
            source: None,
        }
    }

    /// A failure below the API layer, without an underlying client error.
    pub fn transport(
        method: impl Into<String>,
        kind: TransportFailure,
        description: impl Into<String>,
    ) -> Self {
        FeedError {
            method: Some(method.into()),
            error_code: None,
            description: description.into(),
            transport: Some(kind),
            retry_after: None,
            source: None,
        }
    }

    /// An error with only a description, as some transports produce.
    pub fn bare(description: impl Into<String>) -> Self {
        FeedError {
            method: None,
            error_code: None,
            description: description.into(),
            transport: None,
            retry_after: None,
            source: None,
        }
    }

    /// Categorizes a reqwest error raised while calling `method`.
    pub fn from_reqwest(method: impl Into<String>, err: reqwest::Error) -> Self {
        let kind = transport_kind(&err);
        FeedError {
            method: Some(method.into()),
            error_code: err.status().map(|s| s.as_u16()),
            description: error_chain(&err),
            transport: Some(kind),
            retry_after: None,
            source: Some(err),
        }
    }

    /// Sets the error code.
    pub fn with_code(mut self, code: u16) -> Self {
        self.error_code = Some(code);
        self
    }

    /// Sets the retry-after hint.
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// Drops the method field, as transports that only report text do.
    pub fn without_method(mut self) -> Self {
        self.method = None;
        self
    }

    /// Returns the concise message used in retry log lines.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

/// Maps a reqwest error onto a [`TransportFailure`].
fn transport_kind(err: &reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        return TransportFailure::Timeout;
    }

    let chain = error_chain(err).to_lowercase();
    if chain.contains("dns") || chain.contains("failed to lookup address") {
        return TransportFailure::Dns;
    }
    if chain.contains("connection reset") || chain.contains("connection closed") {
        return TransportFailure::ConnectionReset;
    }
    if err.is_connect() {
        return TransportFailure::Connect;
    }
    if err.is_body() || err.is_decode() {
        return TransportFailure::Body;
    }
    TransportFailure::Other
}

/// Joins an error and its sources into one line.
///
/// reqwest's top-level message is usually just "error sending request"; the
/// useful part (DNS, reset, ...) lives in the source chain.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        current = cause.source();
    }
    out
}
