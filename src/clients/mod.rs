//! Trait seams for the external collaborators (customer directory,
//! messaging gateway, payment-link service, ledger sink) and their HTTP
//! implementations. The engines only ever depend on the traits, so tests
//! swap these for in-memory fakes.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::ServiceError;
use crate::models::{CustomerProfile, OrderRecord, OrderStatus, PaymentLink};

pub mod razorpay;
pub mod sheets;
pub mod shopify;
pub mod whatsapp;

pub use razorpay::RazorpayLinks;
pub use sheets::SheetsLedger;
pub use shopify::ShopifyDirectory;
pub use whatsapp::WhatsAppGateway;

/// A quick-reply button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub id: String,
    pub title: String,
}

impl Button {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
        }
    }
}

/// One row of an interactive pick-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
}

/// A titled section of an interactive pick-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

/// Customer directory lookup by phone number.
///
/// Treated as a pure function with network failure modes; callers fail open
/// on error (an outage must never block a shopper).
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn lookup(&self, phone: &str) -> Result<Option<CustomerProfile>, ServiceError>;
}

/// Outbound structured messages to a shopper.
///
/// Fire-and-forget from the core's perspective: delivery failures are logged
/// by callers and never roll back a state transition.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ServiceError>;

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: &[Button],
    ) -> Result<(), ServiceError>;

    async fn send_list(
        &self,
        to: &str,
        header: &str,
        body: &str,
        sections: &[ListSection],
    ) -> Result<(), ServiceError>;

    async fn send_link_button(
        &self,
        to: &str,
        body: &str,
        label: &str,
        url: &str,
    ) -> Result<(), ServiceError>;

    async fn send_catalog(&self, to: &str, body: &str) -> Result<(), ServiceError>;
}

/// Hosted payment-link issuance.
#[async_trait]
pub trait PaymentLinks: Send + Sync {
    async fn create_link(
        &self,
        amount: Decimal,
        currency: &str,
        order_id: &str,
        payee_name: &str,
        payee_contact: &str,
    ) -> Result<PaymentLink, ServiceError>;
}

/// Durable order ledger. Side-effect only; no control flow in the engines
/// depends on its success.
#[async_trait]
pub trait LedgerSink: Send + Sync {
    async fn append_order(&self, record: &OrderRecord) -> Result<(), ServiceError>;

    async fn update_status(&self, order_id: &str, status: OrderStatus)
        -> Result<(), ServiceError>;
}
