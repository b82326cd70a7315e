//! Bot API client over HTTPS.
//!
//! Every call is `POST {api_base}/bot{token}/{method}` with a JSON body. The
//! response is always wrapped in an envelope:
//!
//! ```json
//! {"ok": true, "result": ...}
//! {"ok": false, "error_code": 409, "description": "...", "parameters": {"retry_after": 3}}
//! ```
//!
//! Decoding the envelope is a pure function so the error mapping can be
//! tested without a server.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::types::{SecretToken, Update};

use super::client::{FeedClient, FetchParams, WebhookRegistration};
use super::error::{FeedError, TransportFailure};

/// Extra time allowed on top of the long-poll timeout before the HTTP request
/// itself is abandoned.
const REQUEST_SLACK: Duration = Duration::from_secs(10);

/// Maximum number of body bytes kept in an error description.
const MAX_BODY_IN_ERROR: usize = 200;

/// The response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// A Bot API client for one bot token.
#[derive(Clone)]
pub struct BotApiClient {
    http: reqwest::Client,
    api_base: String,
    token: SecretToken,
}

impl BotApiClient {
    /// Creates a client, optionally routing all traffic through `proxy`.
    pub fn new(
        api_base: impl Into<String>,
        token: SecretToken,
        proxy: Option<&str>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder().use_rustls_tls();
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let http = builder.build()?;

        Ok(BotApiClient {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token.expose(), method)
    }

    /// Calls `method` and returns the envelope's `result`.
    async fn call(&self, method: &str, body: Value, timeout: Duration) -> Result<Value, FeedError> {
        debug!(method, timeout = ?timeout, "Calling Bot API");

        // without_url() keeps the token out of error messages.
        let response = self
            .http
            .post(self.method_url(method))
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FeedError::from_reqwest(method, e.without_url()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FeedError::from_reqwest(method, e.without_url()))?;

        decode_response(method, status, &bytes)
    }
}

impl std::fmt::Debug for BotApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotApiClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl FeedClient for BotApiClient {
    async fn delete_webhook(&self) -> Result<(), FeedError> {
        self.call(
            "deleteWebhook",
            json!({ "drop_pending_updates": false }),
            REQUEST_SLACK,
        )
        .await
        .map(|_| ())
    }

    async fn fetch_updates(&self, params: FetchParams) -> Result<Vec<Update>, FeedError> {
        let body = fetch_body(&params);
        let result = self
            .call("getUpdates", body, params.timeout + REQUEST_SLACK)
            .await?;

        serde_json::from_value(result).map_err(|e| {
            FeedError::transport(
                "getUpdates",
                TransportFailure::Body,
                format!("malformed update list: {}", e),
            )
        })
    }

    async fn set_webhook(&self, registration: WebhookRegistration) -> Result<(), FeedError> {
        let mut body = json!({
            "url": registration.url,
            "allowed_updates": registration.allowed_updates,
        });
        if let Some(secret) = &registration.secret {
            body["secret_token"] = Value::String(secret.expose().to_string());
        }
        self.call("setWebhook", body, REQUEST_SLACK).await.map(|_| ())
    }
}

/// Builds the `getUpdates` request body.
fn fetch_body(params: &FetchParams) -> Value {
    let mut body = json!({ "timeout": params.timeout.as_secs() });
    if let Some(offset) = params.offset {
        body["offset"] = json!(offset.0);
    }
    if let Some(allowed) = &params.allowed_updates {
        body["allowed_updates"] = json!(allowed);
    }
    body
}

/// Decodes a response envelope into its `result` or a [`FeedError`].
///
/// A body that is not an envelope keeps the HTTP status as the error code
/// when the status is an error; a 2xx with a garbage body is a decode failure.
pub fn decode_response(method: &str, status: StatusCode, body: &[u8]) -> Result<Value, FeedError> {
    let envelope: ApiResponse = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            if status.is_success() {
                return Err(FeedError::transport(
                    method,
                    TransportFailure::Body,
                    format!("malformed response: {}", e),
                ));
            }
            return Err(FeedError::api(method, status.as_u16(), body_excerpt(status, body)));
        }
    };

    if envelope.ok {
        return Ok(envelope.result.unwrap_or(Value::Null));
    }

    let code = envelope.error_code.unwrap_or(status.as_u16());
    let description = envelope
        .description
        .unwrap_or_else(|| format!("request failed with status {}", status));
    let mut err = FeedError::api(method, code, description);
    if let Some(secs) = envelope.parameters.and_then(|p| p.retry_after) {
        err = err.with_retry_after(Duration::from_secs(secs));
    }
    Err(err)
}

fn body_excerpt(status: StatusCode, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return status.to_string();
    }
    match text.char_indices().nth(MAX_BODY_IN_ERROR) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
