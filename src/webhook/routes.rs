//! HTTP endpoints: inbound webhook, delivery status callback, job lookup, health.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use super::model::{InboundWebhook, StatusCallback};
use crate::error::WebhookError;
use crate::relay::{InboundOutcome, Relay};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

/// Build the Axum router.
pub fn relay_routes(relay: Arc<Relay>) -> Router {
    let state = AppState { relay };

    Router::new()
        .route("/whatsapp/webhook", post(inbound_webhook))
        .route("/whatsapp/status", post(status_callback))
        .route("/jobs/{id}", get(job_status))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingSender => StatusCode::BAD_REQUEST,
            WebhookError::Ai(_) => StatusCode::BAD_GATEWAY,
        };
        error_response(status, &self.to_string())
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let outbox = state.relay.outbox();
    Json(serde_json::json!({
        "status": "ok",
        "service": "whatsapp-relay",
        "queue": {
            "pending": outbox.pending(),
            "capacity": outbox.capacity(),
            "dropped": outbox.dropped(),
            "workers": outbox.workers(),
        },
        "sessions": state.relay.sessions().len().await,
    }))
}

// ── Inbound ─────────────────────────────────────────────────────────────

async fn inbound_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: InboundWebhook = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Invalid webhook payload");
            return error_response(StatusCode::BAD_REQUEST, "invalid payload");
        }
    };

    let span = info_span!("inbound", event_id = %Uuid::new_v4());
    match state.relay.handle_inbound(&payload).instrument(span).await {
        Ok(InboundOutcome::Ignored) => StatusCode::NO_CONTENT.into_response(),
        Ok(InboundOutcome::Accepted { .. }) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            if matches!(e, WebhookError::MissingSender) {
                warn!(event = %payload.event, "Webhook payload without sender phone");
            }
            e.into_response()
        }
    }
}

// ── Delivery status ─────────────────────────────────────────────────────

async fn status_callback(State(state): State<AppState>, body: Bytes) -> Response {
    let callback: StatusCallback = match serde_json::from_slice(&body) {
        Ok(callback) => callback,
        Err(e) => {
            warn!(error = %e, "Invalid status callback payload");
            return error_response(StatusCode::BAD_REQUEST, "invalid payload");
        }
    };

    if callback.message_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "messageId required");
    }

    let record = state
        .relay
        .upsert_job_status(
            callback.message_id.trim(),
            &callback.status,
            &callback.destination,
            &callback.conversation_id,
        )
        .await;

    debug!(message_id = %record.message_id, status = %record.status, "Status callback applied");
    Json(record).into_response()
}

// ── Job lookup ──────────────────────────────────────────────────────────

async fn job_status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.relay.get_job_status(&id).await {
        Some(record) => Json(record).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "job not found"),
    }
}
