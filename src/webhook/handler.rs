//! Webhook endpoint handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, warn};

use super::WebhookState;
use super::secret::{SECRET_HEADER, verify_secret};
use crate::offset::OffsetStore;
use crate::runner::UpdateHandler;
use crate::types::Update;

/// Errors that can occur when processing a delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// A secret is configured but the delivery carries none.
    #[error("missing secret token header")]
    MissingSecret,

    /// The delivery's secret does not match.
    #[error("invalid secret token")]
    InvalidSecret,

    /// The body is not a valid update.
    #[error("invalid update body: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingSecret | WebhookError::InvalidSecret => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidJson(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Update delivery handler.
///
/// # Response
///
/// - 200 OK: the update was handled, or was already handled before
/// - 400 Bad Request: the body is not an update
/// - 401 Unauthorized: missing or wrong secret token
///
/// Handler errors are logged and still answered with 200; the feed would
/// otherwise redeliver the same update indefinitely.
pub async fn update_handler<S, H>(
    State(state): State<WebhookState<S, H>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError>
where
    S: OffsetStore + 'static,
    H: UpdateHandler,
{
    if let Some(expected) = state.secret() {
        let provided = headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(WebhookError::MissingSecret)?;
        if !verify_secret(expected, provided) {
            warn!("Rejected webhook delivery with invalid secret");
            return Err(WebhookError::InvalidSecret);
        }
    }

    let update: Update = serde_json::from_slice(&body)?;
    let id = update.update_id;

    if state.is_processed(id) {
        debug!(update_id = %id, "Skipping already processed update");
        return Ok(StatusCode::OK);
    }

    if let Err(e) = state.handler().handle(update).await {
        warn!(update_id = %id, error = %e, "Update handler failed");
    }
    state.advance(id);

    Ok(StatusCode::OK)
}

/// Health check handler.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
