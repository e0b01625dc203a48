//! Ledger event channel. State transitions in the engines emit events here
//! and move on; a background worker drains the channel into the ledger sink.
//! A slow or failing ledger therefore never stalls or rolls back a
//! conversation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::clients::LedgerSink;
use crate::models::{OrderRecord, OrderStatus};

/// Events the engines publish for durable recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// A finalized order to append to the ledger.
    OrderPlaced(OrderRecord),
    /// A status change for a previously appended order.
    OrderStatusChanged {
        order_id: String,
        status: OrderStatus,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event. A full or closed channel is logged and swallowed;
    /// ledger recording is best-effort by contract.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("dropping ledger event, channel unavailable: {}", e);
        }
    }
}

/// Builds the channel pair used by `main` and the test harness.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains ledger events until every sender is gone. Spawned once at startup.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, ledger: Arc<dyn LedgerSink>) {
    info!("ledger event worker started");
    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderPlaced(record) => {
                if let Err(e) = ledger.append_order(&record).await {
                    error!(order_id = %record.order_id, "failed to append order row: {}", e);
                }
            }
            Event::OrderStatusChanged { order_id, status } => {
                if let Err(e) = ledger.update_status(&order_id, status).await {
                    error!(%order_id, "failed to update order status: {}", e);
                }
            }
        }
    }
    info!("ledger event worker stopped");
}
