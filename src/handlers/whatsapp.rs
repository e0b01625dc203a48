//! WhatsApp webhook endpoints: subscription verification and inbound
//! message events.
//!
//! The provider retries deliveries that are not acknowledged, so the event
//! endpoint answers 200 even for payloads it drops; per-session locking in
//! the engine makes redelivered events safe.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::clients::whatsapp::extract_inbound_event;
use crate::AppState;

/// GET /webhook
///
/// Meta's webhook subscription handshake: echo `hub.challenge` when
/// `hub.verify_token` matches the configured token.
#[utoipa::path(
    get,
    path = "/webhook",
    params(
        ("hub.mode" = Option<String>, Query, description = "Always 'subscribe'"),
        ("hub.verify_token" = Option<String>, Query, description = "Token configured in the app dashboard"),
        ("hub.challenge" = Option<String>, Query, description = "Challenge to echo back")
    ),
    responses(
        (status = 200, description = "Subscription verified, challenge echoed"),
        (status = 403, description = "Verify token mismatch")
    ),
    tag = "WhatsApp"
)]
pub async fn verify_subscription(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();
    if token == Some(state.config.whatsapp.verify_token.as_str()) {
        (StatusCode::OK, challenge)
    } else {
        warn!("webhook verification failed: token mismatch");
        (StatusCode::FORBIDDEN, "Verification failed".to_string())
    }
}

/// POST /webhook
///
/// Inbound message deliveries. The raw envelope is normalized once here;
/// anything that is not a recognizable user message (status receipts,
/// unsupported types, malformed shapes) is acknowledged and dropped.
#[utoipa::path(
    post,
    path = "/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Event accepted or ignored")
    ),
    tag = "WhatsApp"
)]
pub async fn receive_event(
    State(state): State<AppState>,
    body: Option<axum::Json<Value>>,
) -> impl IntoResponse {
    let Some(axum::Json(body)) = body else {
        debug!("empty or non-json webhook delivery");
        return (StatusCode::OK, "ignored");
    };
    let Some(event) = extract_inbound_event(&body) else {
        debug!("webhook delivery carried no actionable message");
        return (StatusCode::OK, "ignored");
    };
    state.conversation.handle(event).await;
    (StatusCode::OK, "ok")
}
