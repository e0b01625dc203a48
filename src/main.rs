use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use jewelbot_api as api;

use api::clients::{
    CustomerDirectory, LedgerSink, MessagingGateway, PaymentLinks, RazorpayLinks, SheetsLedger,
    ShopifyDirectory, WhatsAppGateway,
};
use api::services::{ConversationEngine, ReconciliationEngine};
use api::sessions::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Arc::new(api::config::load_config()?);
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    // External collaborators behind their trait seams.
    let directory: Arc<dyn CustomerDirectory> =
        Arc::new(ShopifyDirectory::new(http.clone(), cfg.shopify.clone()));
    let messaging: Arc<dyn MessagingGateway> =
        Arc::new(WhatsAppGateway::new(http.clone(), cfg.whatsapp.clone()));
    let payment_links: Arc<dyn PaymentLinks> =
        Arc::new(RazorpayLinks::new(http.clone(), cfg.razorpay.clone()));
    let ledger: Arc<dyn LedgerSink> = Arc::new(SheetsLedger::new(http, cfg.sheets.clone()));

    // Ledger writes go through a channel so no handler ever waits on them.
    let (event_sender, event_rx) = api::events::channel(cfg.event_channel_capacity);
    tokio::spawn(api::events::process_events(event_rx, ledger));

    let sessions = Arc::new(SessionStore::new());
    let conversation = Arc::new(ConversationEngine::new(
        sessions.clone(),
        directory,
        messaging.clone(),
        payment_links.clone(),
        event_sender.clone(),
        cfg.clone(),
    ));
    let reconciliation = Arc::new(ReconciliationEngine::new(
        sessions.clone(),
        messaging,
        payment_links,
        event_sender.clone(),
        cfg.clone(),
    ));

    let app_state = api::AppState {
        config: cfg.clone(),
        sessions,
        conversation,
        reconciliation,
        event_sender,
    };

    let app = api::routes()
        .merge(api::openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(app_state);

    let host = cfg
        .host
        .parse()
        .with_context(|| format!("invalid host '{}'", cfg.host))?;
    let addr = SocketAddr::new(host, cfg.port);
    info!("jewelbot-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
