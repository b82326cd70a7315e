//! Webhook delivery mode.
//!
//! Instead of long-polling, the feed pushes each update to an HTTP endpoint.
//! There is no ownership contention in this mode: the feed delivers to
//! whichever URL was registered last.
//!
//! # Endpoints
//!
//! - `POST <path>` - Accepts one update (checks the secret token if configured)
//! - `GET /health` - Returns 200 if the listener is running

use std::io;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod handler;
pub mod secret;

pub use handler::{WebhookError, health_handler, update_handler};
pub use secret::{SECRET_HEADER, verify_secret};

use crate::config::WebhookSettings;
use crate::feed::{FeedClient, FeedError, WebhookRegistration};
use crate::offset::{OffsetCursor, OffsetStore};
use crate::runner::UpdateHandler;
use crate::types::{SecretToken, UpdateId};

/// Errors that stop the webhook listener.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The feed refused the webhook registration.
    #[error("webhook registration failed: {0}")]
    Registration(#[source] FeedError),

    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The server failed while running.
    #[error("webhook server error: {0}")]
    Io(#[source] io::Error),
}

/// Shared state for the webhook handlers.
pub struct WebhookState<S, H> {
    inner: Arc<WebhookStateInner<S, H>>,
}

struct WebhookStateInner<S, H> {
    cursor: Mutex<OffsetCursor<S>>,
    handler: Arc<H>,
    secret: Option<SecretToken>,
}

impl<S, H> Clone for WebhookState<S, H> {
    fn clone(&self) -> Self {
        WebhookState {
            inner: self.inner.clone(),
        }
    }
}

impl<S: OffsetStore, H> WebhookState<S, H> {
    pub fn new(cursor: OffsetCursor<S>, handler: Arc<H>, secret: Option<SecretToken>) -> Self {
        WebhookState {
            inner: Arc::new(WebhookStateInner {
                cursor: Mutex::new(cursor),
                handler,
                secret,
            }),
        }
    }

    /// The secret deliveries must carry, if any.
    pub fn secret(&self) -> Option<&SecretToken> {
        self.inner.secret.as_ref()
    }

    pub fn handler(&self) -> &H {
        &self.inner.handler
    }

    /// Returns true if `id` was already handled.
    pub fn is_processed(&self, id: UpdateId) -> bool {
        self.cursor().is_processed(id)
    }

    /// Records `id` as handled.
    pub fn advance(&self, id: UpdateId) -> bool {
        self.cursor().advance(id)
    }

    /// The last handled update id.
    pub fn last_update_id(&self) -> Option<UpdateId> {
        self.cursor().last()
    }

    fn cursor(&self) -> std::sync::MutexGuard<'_, OffsetCursor<S>> {
        // The cursor stays consistent even if a holder panicked: every
        // mutation is a single assignment.
        self.inner
            .cursor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Builds the router serving updates on `path`.
pub fn build_router<S, H>(path: &str, state: WebhookState<S, H>) -> axum::Router
where
    S: OffsetStore + 'static,
    H: UpdateHandler,
{
    use axum::routing::{get, post};

    axum::Router::new()
        .route(path, post(update_handler::<S, H>))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Registers the webhook and serves deliveries until `cancel` fires.
pub async fn serve<C, S, H>(
    client: &C,
    settings: &WebhookSettings,
    cursor: OffsetCursor<S>,
    handler: Arc<H>,
    allowed_updates: Vec<String>,
    cancel: CancellationToken,
) -> Result<(), ServeError>
where
    C: FeedClient,
    S: OffsetStore + 'static,
    H: UpdateHandler,
{
    client
        .set_webhook(WebhookRegistration {
            url: settings.url.clone(),
            secret: settings.secret.clone(),
            allowed_updates,
        })
        .await
        .map_err(ServeError::Registration)?;
    info!(url = %settings.url, "Registered webhook");

    let addr = settings.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServeError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(addr = %addr, path = %settings.path, "Webhook listener started");

    let state = WebhookState::new(cursor, handler, settings.secret.clone());
    let app = build_router(&settings.path, state);

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(ServeError::Io)?;

    info!("Webhook listener stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::offset::MemoryOffsetStore;
    use crate::test_utils::{Reaction, RecordingHandler, SimulatedFeed};
    use crate::types::{AccountId, default_allowed_updates};

    const PATH: &str = "/telegram-webhook";

    fn test_state(
        secret: Option<&str>,
        store: &Arc<MemoryOffsetStore>,
        handler: &RecordingHandler,
    ) -> WebhookState<MemoryOffsetStore, RecordingHandler> {
        let cursor = OffsetCursor::load(AccountId::default(), store.clone()).unwrap();
        WebhookState::new(
            cursor,
            Arc::new(handler.clone()),
            secret.and_then(SecretToken::new),
        )
    }

    fn delivery(body: &str, secret: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(PATH)
            .header("content-type", "application/json");
        if let Some(secret) = secret {
            builder = builder.header(SECRET_HEADER, secret);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn stored(store: &MemoryOffsetStore) -> Option<UpdateId> {
        store.read(&AccountId::default()).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let store = Arc::new(MemoryOffsetStore::new());
        let app = build_router(PATH, test_state(None, &store, &RecordingHandler::new()));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn delivery_is_handled_and_persisted() {
        let store = Arc::new(MemoryOffsetStore::new());
        let handler = RecordingHandler::new();
        let app = build_router(PATH, test_state(None, &store, &handler));

        let response = app
            .oneshot(delivery(r#"{"update_id":77,"message":{"text":"hi"}}"#, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(handler.handled(), vec![UpdateId(77)]);
        assert_eq!(stored(&store), Some(UpdateId(77)));
    }

    #[tokio::test]
    async fn processed_update_is_skipped() {
        let store = Arc::new(MemoryOffsetStore::with_offset(AccountId::default(), UpdateId(80)));
        let handler = RecordingHandler::new();
        let app = build_router(PATH, test_state(None, &store, &handler));

        let response = app
            .oneshot(delivery(r#"{"update_id":80,"message":{}}"#, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(handler.handled().is_empty());
    }

    #[tokio::test]
    async fn handler_failure_still_acknowledges() {
        let store = Arc::new(MemoryOffsetStore::new());
        let handler = RecordingHandler::new();
        handler.react(5, Reaction::Fail);
        let state = test_state(None, &store, &handler);
        let app = build_router(PATH, state.clone());

        let response = app
            .oneshot(delivery(r#"{"update_id":5,"message":{}}"#, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.last_update_id(), Some(UpdateId(5)));
        assert_eq!(stored(&store), Some(UpdateId(5)));
    }

    #[tokio::test]
    async fn invalid_json_is_rejected() {
        let store = Arc::new(MemoryOffsetStore::new());
        let handler = RecordingHandler::new();
        let app = build_router(PATH, test_state(None, &store, &handler));

        let response = app.oneshot(delivery("{not json", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(stored(&store), None);
    }

    #[tokio::test]
    async fn body_without_update_id_is_rejected() {
        let store = Arc::new(MemoryOffsetStore::new());
        let app = build_router(PATH, test_state(None, &store, &RecordingHandler::new()));

        let response = app
            .oneshot(delivery(r#"{"message":{}}"#, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_secret_is_unauthorized() {
        let store = Arc::new(MemoryOffsetStore::new());
        let handler = RecordingHandler::new();
        let app = build_router(PATH, test_state(Some("s3cret"), &store, &handler));

        let response = app
            .oneshot(delivery(r#"{"update_id":1}"#, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(handler.handled().is_empty());
    }

    #[tokio::test]
    async fn wrong_secret_is_unauthorized() {
        let store = Arc::new(MemoryOffsetStore::new());
        let handler = RecordingHandler::new();
        let app = build_router(PATH, test_state(Some("s3cret"), &store, &handler));

        let response = app
            .oneshot(delivery(r#"{"update_id":1}"#, Some("guess")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(stored(&store), None);
    }

    #[tokio::test]
    async fn correct_secret_is_accepted() {
        let store = Arc::new(MemoryOffsetStore::new());
        let handler = RecordingHandler::new();
        let app = build_router(PATH, test_state(Some("s3cret"), &store, &handler));

        let response = app
            .oneshot(delivery(r#"{"update_id":1}"#, Some("s3cret")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(handler.handled(), vec![UpdateId(1)]);
    }

    #[tokio::test]
    async fn other_paths_are_not_found() {
        let store = Arc::new(MemoryOffsetStore::new());
        let app = build_router(PATH, test_state(None, &store, &RecordingHandler::new()));

        let response = app
            .oneshot(
                Request::post("/elsewhere")
                    .body(Body::from(r#"{"update_id":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // ─── serve ───

    fn local_settings() -> WebhookSettings {
        WebhookSettings {
            url: "https://bot.example.org/telegram-webhook".into(),
            host: "127.0.0.1".into(),
            port: 0,
            path: PATH.into(),
            secret: None,
        }
    }

    #[tokio::test]
    async fn registration_failure_is_reported() {
        let feed = SimulatedFeed::new();
        let client = feed.client("a");
        client.fail_set_webhook(FeedError::api("setWebhook", 400, "Bad Request: bad webhook"));
        let store = Arc::new(MemoryOffsetStore::new());
        let cursor = OffsetCursor::load(AccountId::default(), store).unwrap();

        let result = serve(
            &client,
            &local_settings(),
            cursor,
            Arc::new(RecordingHandler::new()),
            default_allowed_updates(),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(ServeError::Registration(_))));
        assert_eq!(feed.webhook(), None);
    }

    #[tokio::test]
    async fn serve_registers_and_stops_on_cancel() {
        let feed = SimulatedFeed::new();
        let client = feed.client("a");
        let store = Arc::new(MemoryOffsetStore::new());
        let cursor = OffsetCursor::load(AccountId::default(), store).unwrap();
        let cancel = CancellationToken::new();

        let server = {
            let cancel = cancel.clone();
            async move {
                serve(
                    &client,
                    &local_settings(),
                    cursor,
                    Arc::new(RecordingHandler::new()),
                    default_allowed_updates(),
                    cancel,
                )
                .await
            }
        };
        let stopper = {
            let feed = feed.clone();
            async move {
                while feed.webhook().is_none() {
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                }
                cancel.cancel();
            }
        };

        let (result, ()) = tokio::join!(server, stopper);

        assert!(result.is_ok());
        assert_eq!(
            feed.webhook().as_deref(),
            Some("https://bot.example.org/telegram-webhook")
        );
    }
}
