//! jewelbot-api library
//!
//! Core of a WhatsApp commerce bot for a jewelry retailer: the per-shopper
//! conversation state machine, the payment reconciliation protocol, and the
//! thin clients for the external services they talk to.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod clients;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod services;
pub mod sessions;

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::{ConversationEngine, ReconciliationEngine};
use crate::sessions::SessionStore;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionStore>,
    pub conversation: Arc<ConversationEngine>,
    pub reconciliation: Arc<ReconciliationEngine>,
    pub event_sender: EventSender,
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "live_sessions": state.sessions.live_sessions(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// All HTTP routes. Layers (tracing, timeouts) are applied by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(|| async { "jewelbot-api up" }))
        .route("/health", get(health))
        .route(
            "/webhook",
            get(handlers::whatsapp::verify_subscription).post(handlers::whatsapp::receive_event),
        )
        .route("/payments/webhook", post(handlers::payments::payment_webhook))
        .route("/payments/callback", get(handlers::payments::payment_callback))
}
