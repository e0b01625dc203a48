//! Shared test harness: in-memory fakes for every external collaborator and
//! a `TestApp` that wires them to the real engines and event plumbing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

use jewelbot_api::clients::{
    Button, CustomerDirectory, LedgerSink, ListSection, MessagingGateway, PaymentLinks,
};
use jewelbot_api::config::{
    AppConfig, RazorpayConfig, SheetsConfig, ShopifyConfig, WhatsAppConfig,
};
use jewelbot_api::errors::ServiceError;
use jewelbot_api::events::{self, Event, EventSender};
use jewelbot_api::models::{
    CartLine, CustomerClass, CustomerProfile, InboundEvent, InboundKind, OrderRecord, OrderStatus,
    PaymentLink,
};
use jewelbot_api::services::{ConversationEngine, ReconciliationEngine};
use jewelbot_api::sessions::SessionStore;
use jewelbot_api::AppState;

pub const WEBHOOK_SECRET: &str = "test_webhook_secret";
pub const KEY_SECRET: &str = "test_key_secret";

pub fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        environment: "development".into(),
        log_level: "debug".into(),
        log_json: false,
        currency: "INR".into(),
        receipt_base_url: Some("https://gems.example/receipts".into()),
        event_channel_capacity: 64,
        whatsapp: WhatsAppConfig {
            token: "wa-token".into(),
            phone_number_id: "1234567890".into(),
            verify_token: "verify-me".into(),
            catalog_thumbnail_product_id: None,
            api_base: "https://graph.facebook.test/v20.0".into(),
        },
        shopify: ShopifyConfig {
            store_domain: "gems.myshopify.com".into(),
            access_token: "shpat_test".into(),
            api_version: "2023-10".into(),
        },
        razorpay: RazorpayConfig {
            key_id: "rzp_test_key".into(),
            key_secret: KEY_SECRET.into(),
            webhook_secret: WEBHOOK_SECRET.into(),
            api_base: "https://api.razorpay.test/v1".into(),
        },
        sheets: SheetsConfig {
            spreadsheet_id: "sheet-1".into(),
            access_token: "ya29.test".into(),
            api_base: "https://sheets.test/v4".into(),
            orders_range: "Orders!A:L".into(),
        },
    }
}

/// What the bot said, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text { to: String, body: String },
    Buttons { to: String, body: String, ids: Vec<String> },
    List { to: String, header: String },
    LinkButton { to: String, body: String, label: String, url: String },
    Catalog { to: String },
}

#[derive(Default)]
pub struct FakeMessenger {
    pub sent: Mutex<Vec<Sent>>,
}

impl FakeMessenger {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_to(&self, phone: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                Sent::Text { to, body } if to == phone => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn link_buttons_labeled(&self, label: &str) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|m| matches!(m, Sent::LinkButton { label: l, .. } if l == label))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MessagingGateway for FakeMessenger {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ServiceError> {
        self.sent.lock().unwrap().push(Sent::Text {
            to: to.into(),
            body: body.into(),
        });
        Ok(())
    }

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: &[Button],
    ) -> Result<(), ServiceError> {
        self.sent.lock().unwrap().push(Sent::Buttons {
            to: to.into(),
            body: body.into(),
            ids: buttons.iter().map(|b| b.id.clone()).collect(),
        });
        Ok(())
    }

    async fn send_list(
        &self,
        to: &str,
        header: &str,
        _body: &str,
        _sections: &[ListSection],
    ) -> Result<(), ServiceError> {
        self.sent.lock().unwrap().push(Sent::List {
            to: to.into(),
            header: header.into(),
        });
        Ok(())
    }

    async fn send_link_button(
        &self,
        to: &str,
        body: &str,
        label: &str,
        url: &str,
    ) -> Result<(), ServiceError> {
        self.sent.lock().unwrap().push(Sent::LinkButton {
            to: to.into(),
            body: body.into(),
            label: label.into(),
            url: url.into(),
        });
        Ok(())
    }

    async fn send_catalog(&self, to: &str, _body: &str) -> Result<(), ServiceError> {
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Catalog { to: to.into() });
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    pub customers: Mutex<HashMap<String, CustomerProfile>>,
    pub fail: AtomicBool,
}

impl FakeDirectory {
    pub fn with_customer(self, phone: &str, name: &str, class: CustomerClass) -> Self {
        self.customers.lock().unwrap().insert(
            phone.to_string(),
            CustomerProfile {
                display_name: name.to_string(),
                class,
            },
        );
        self
    }
}

#[async_trait]
impl CustomerDirectory for FakeDirectory {
    async fn lookup(&self, phone: &str) -> Result<Option<CustomerProfile>, ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "directory unavailable".into(),
            ));
        }
        Ok(self.customers.lock().unwrap().get(phone).cloned())
    }
}

#[derive(Default)]
pub struct FakePaymentLinks {
    counter: AtomicUsize,
    pub fail: AtomicBool,
    pub requests: Mutex<Vec<(String, Decimal)>>,
}

impl FakePaymentLinks {
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentLinks for FakePaymentLinks {
    async fn create_link(
        &self,
        amount: Decimal,
        _currency: &str,
        order_id: &str,
        _payee_name: &str,
        _payee_contact: &str,
    ) -> Result<PaymentLink, ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError("gateway down".into()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .unwrap()
            .push((order_id.to_string(), amount));
        Ok(PaymentLink {
            link_id: format!("plink-{}", n),
            url: format!("https://rzp.test/pay/{}", n),
        })
    }
}

#[derive(Default)]
pub struct FakeLedger {
    pub rows: Mutex<Vec<OrderRecord>>,
    pub updates: Mutex<Vec<(String, OrderStatus)>>,
}

impl FakeLedger {
    pub fn rows(&self) -> Vec<OrderRecord> {
        self.rows.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, OrderStatus)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerSink for FakeLedger {
    async fn append_order(&self, record: &OrderRecord) -> Result<(), ServiceError> {
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), ServiceError> {
        self.updates
            .lock()
            .unwrap()
            .push((order_id.to_string(), status));
        Ok(())
    }
}

/// The real engines over fake collaborators. Ledger events are drained on
/// demand so assertions are deterministic.
pub struct TestApp {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionStore>,
    pub conversation: Arc<ConversationEngine>,
    pub reconciliation: Arc<ReconciliationEngine>,
    pub messenger: Arc<FakeMessenger>,
    pub directory: Arc<FakeDirectory>,
    pub links: Arc<FakePaymentLinks>,
    pub ledger: Arc<FakeLedger>,
    pub event_sender: EventSender,
    event_rx: tokio::sync::Mutex<mpsc::Receiver<Event>>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_directory(FakeDirectory::default())
    }

    pub fn with_directory(directory: FakeDirectory) -> Self {
        let config = Arc::new(test_config());
        let sessions = Arc::new(SessionStore::new());
        let messenger = Arc::new(FakeMessenger::default());
        let directory = Arc::new(directory);
        let links = Arc::new(FakePaymentLinks::default());
        let ledger = Arc::new(FakeLedger::default());
        let (event_sender, event_rx) = events::channel(config.event_channel_capacity);

        let conversation = Arc::new(ConversationEngine::new(
            sessions.clone(),
            directory.clone(),
            messenger.clone(),
            links.clone(),
            event_sender.clone(),
            config.clone(),
        ));
        let reconciliation = Arc::new(ReconciliationEngine::new(
            sessions.clone(),
            messenger.clone(),
            links.clone(),
            event_sender.clone(),
            config.clone(),
        ));

        Self {
            config,
            sessions,
            conversation,
            reconciliation,
            messenger,
            directory,
            links,
            ledger,
            event_sender,
            event_rx: tokio::sync::Mutex::new(event_rx),
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            config: self.config.clone(),
            sessions: self.sessions.clone(),
            conversation: self.conversation.clone(),
            reconciliation: self.reconciliation.clone(),
            event_sender: self.event_sender.clone(),
        }
    }

    /// Applies every queued ledger event to the fake ledger.
    pub async fn drain_events(&self) {
        let mut rx = self.event_rx.lock().await;
        while let Ok(event) = rx.try_recv() {
            match event {
                Event::OrderPlaced(record) => {
                    self.ledger.append_order(&record).await.unwrap();
                }
                Event::OrderStatusChanged { order_id, status } => {
                    self.ledger.update_status(&order_id, status).await.unwrap();
                }
            }
        }
    }

    pub async fn send_text(&self, phone: &str, body: &str) {
        self.conversation
            .handle(InboundEvent {
                phone: phone.into(),
                kind: InboundKind::Text(body.into()),
            })
            .await;
    }

    pub async fn tap_button(&self, phone: &str, id: &str) {
        self.conversation
            .handle(InboundEvent {
                phone: phone.into(),
                kind: InboundKind::ButtonReply {
                    id: id.into(),
                    title: id.into(),
                },
            })
            .await;
    }

    pub async fn send_cart(&self, phone: &str, lines: Vec<CartLine>) {
        self.conversation
            .handle(InboundEvent {
                phone: phone.into(),
                kind: InboundKind::CartOrder(lines),
            })
            .await;
    }

    /// Walks a session through profile collection with canned answers.
    pub async fn complete_profile(&self, phone: &str, wholesale: bool) {
        self.send_text(phone, "Asha Jain").await;
        self.send_text(phone, "918000000000").await;
        self.send_text(phone, "asha@example.com").await;
        if wholesale {
            self.send_text(phone, "Jain Jewels Pvt Ltd").await;
            self.send_text(phone, "27AAAPL1234C1ZV").await;
        }
        self.send_text(phone, "12 MG Road").await;
        self.send_text(phone, "Pune").await;
    }
}

pub fn line(id: &str, qty: u32, price: Decimal) -> CartLine {
    CartLine {
        product_retailer_id: id.to_string(),
        quantity: qty,
        unit_price: price,
        currency: "INR".into(),
    }
}

pub fn sample_cart() -> Vec<CartLine> {
    vec![line("ring-22k", 2, dec!(1500.50)), line("chain-18k", 1, dec!(999))]
}
