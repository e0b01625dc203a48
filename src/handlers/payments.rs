//! Payment-gateway notification endpoints: the asynchronous webhook and the
//! synchronous browser redirect. Both authenticate before the
//! reconciliation engine is allowed to touch any session.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse};
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::ServiceError;
use crate::models::PaymentOutcome;
use crate::services::reconciliation::{
    parse_webhook_event, verify_callback_signature, verify_webhook_signature, PaymentCallback,
};
use crate::AppState;

const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// POST /payments/webhook
///
/// Asynchronous gateway webhook. The signature is an HMAC over the raw
/// request body, so the body is read as bytes and verified before any JSON
/// parsing is trusted.
#[utoipa::path(
    post,
    path = "/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted or ignored"),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ServiceError::InvalidSignature)?;
    if !verify_webhook_signature(&body, signature, &state.config.razorpay.webhook_secret) {
        warn!("payment webhook signature verification failed");
        return Err(ServiceError::InvalidSignature);
    }

    let json: Value = serde_json::from_slice(&body)?;
    let Some((order_id, outcome)) = parse_webhook_event(&json) else {
        debug!("payment webhook event not relevant to reconciliation");
        return Ok((StatusCode::OK, "ignored"));
    };
    state.reconciliation.reconcile(&order_id, outcome).await;
    Ok((StatusCode::OK, "ok"))
}

/// GET /payments/callback
///
/// Synchronous redirect after the hosted payment page. Carries a signature
/// over a fixed field set rather than a request body. The response is shown
/// in the shopper's browser, so it is a tiny human-readable page.
#[utoipa::path(
    get,
    path = "/payments/callback",
    params(
        ("razorpay_payment_id" = String, Query, description = "Gateway payment id"),
        ("razorpay_payment_link_id" = String, Query, description = "Hosted link id"),
        ("razorpay_payment_link_reference_id" = String, Query, description = "Our order id"),
        ("razorpay_payment_link_status" = String, Query, description = "paid / failed / cancelled"),
        ("razorpay_signature" = String, Query, description = "HMAC over the field set")
    ),
    responses(
        (status = 200, description = "Callback processed"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    Query(callback): Query<PaymentCallback>,
) -> Result<impl IntoResponse, ServiceError> {
    if !verify_callback_signature(&callback, &state.config.razorpay.key_secret) {
        warn!("payment callback signature verification failed");
        return Err(ServiceError::InvalidSignature);
    }
    let order_id = callback.razorpay_payment_link_reference_id.clone();
    let outcome = callback.outcome();
    state.reconciliation.reconcile(&order_id, outcome).await;

    let page = match outcome {
        PaymentOutcome::Paid => {
            "<html><body><h3>Payment received 🎉</h3><p>You can return to WhatsApp.</p></body></html>"
        }
        PaymentOutcome::Failed => {
            "<html><body><h3>Payment not completed</h3><p>Check WhatsApp for a retry link.</p></body></html>"
        }
    };
    Ok(Html(page))
}
