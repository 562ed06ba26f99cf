//! HTTP routes for webhook mode.
//!
//! - `POST /webhook/telegram/:token` receives Bot API updates
//! - `POST /:token` same handler, for a public URL pointing at the host root
//! - `GET /health` liveness
//! - `GET /ready` readiness (the message queue is still open)

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sheetcol_common::Error;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::limit::RequestBodyLimitLayer;

use crate::message::ChannelMessage;
use crate::telegram::TelegramChannel;

/// Updates are small JSON documents; files are fetched separately.
const MAX_UPDATE_BYTES: usize = 1024 * 1024;

const SERVICE_NAME: &str = "sheetcol";

// ============================================================================
// State
// ============================================================================

/// Shared state for the webhook HTTP server.
pub struct ChannelsState {
    /// Telegram channel instance (if configured)
    pub telegram: Option<Arc<TelegramChannel>>,
    /// Queue feeding the dispatcher
    pub message_tx: mpsc::UnboundedSender<ChannelMessage>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

impl HealthResponse {
    fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookResponse {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }
}

fn error_response(err: &Error) -> (StatusCode, Json<WebhookResponse>) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(WebhookResponse {
            success: false,
            message: Some(err.to_string()),
        }),
    )
}

// ============================================================================
// Health Routes
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(HealthResponse::new("healthy"))
}

async fn ready(State(state): State<Arc<ChannelsState>>) -> impl IntoResponse {
    if state.message_tx.is_closed() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse::new("not_ready")),
        );
    }

    (StatusCode::OK, Json(HealthResponse::new("ready")))
}

// ============================================================================
// Telegram Webhook
// ============================================================================

async fn telegram_webhook(
    State(state): State<Arc<ChannelsState>>,
    Path(token): Path<String>,
    Json(update): Json<Value>,
) -> impl IntoResponse {
    let Some(telegram) = &state.telegram else {
        return error_response(&Error::NotFound("Telegram channel".into()));
    };

    if !telegram.token_matches(&token) {
        tracing::warn!("Telegram webhook called with an invalid token");
        return error_response(&Error::Auth("webhook token mismatch".into()));
    }

    let update_id = update
        .get("update_id")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or_default();
    tracing::debug!(update_id, "Telegram webhook update received");

    // Updates the bot does not act on are still acknowledged so Telegram
    // stops redelivering them.
    if let Some(message) = telegram.parse_update(&update) {
        if state.message_tx.send(message).is_err() {
            tracing::error!("Failed to forward Telegram message: queue closed");
            return error_response(&Error::Unavailable("message queue closed".into()));
        }
    }

    (StatusCode::OK, Json(WebhookResponse::ok()))
}

// ============================================================================
// Router Builder
// ============================================================================

/// Build the webhook HTTP router.
pub fn build_router(state: Arc<ChannelsState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Channel webhooks
        .route("/webhook/telegram/:token", post(telegram_webhook))
        .route("/:token", post(telegram_webhook))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_UPDATE_BYTES))
        .with_state(state)
}

/// Create a router state with the receiving end of its message queue.
pub fn create_state(
    telegram: Option<Arc<TelegramChannel>>,
) -> (Arc<ChannelsState>, mpsc::UnboundedReceiver<ChannelMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Arc::new(ChannelsState {
            telegram,
            message_tx: tx,
        }),
        rx,
    )
}
