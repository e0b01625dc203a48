//! Domain model for the bot: per-phone conversation sessions, carts,
//! pending orders and the ledger row written when an order is placed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Canonicalizes a phone number to its digit string (E.164 without the `+`).
///
/// All session keys and directory lookups go through this at the system
/// boundary so internal logic never branches on formatting variants.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Directory matching tolerates differing country-code conventions between
/// the messaging provider and the customer directory by comparing the last
/// ten digits (national significant number).
pub fn phones_match(a: &str, b: &str) -> bool {
    let a = normalize_phone(a);
    let b = normalize_phone(b);
    let tail = |s: &str| s.chars().rev().take(10).collect::<Vec<_>>();
    !a.is_empty() && tail(&a) == tail(&b)
}

/// Customer classification resolved from the directory or an explicit
/// in-conversation choice. Drives the catalog-vs-payment branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CustomerClass {
    Unknown,
    Retail,
    Wholesale,
}

impl CustomerClass {
    pub fn is_wholesale(self) -> bool {
        matches!(self, CustomerClass::Wholesale)
    }
}

/// Contact fields collected one free-text reply at a time.
///
/// Order is fixed: `Name → AltPhone → Email → [Company → TaxId] → Address →
/// City`, with the bracketed fields asked only of wholesale customers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Name,
    AltPhone,
    Email,
    Company,
    TaxId,
    Address,
    City,
}

impl ProfileField {
    /// The sub-step following this one for the given classification, or
    /// `None` when the collection cycle is complete.
    pub fn next(self, class: CustomerClass) -> Option<ProfileField> {
        use ProfileField::*;
        Some(match self {
            Name => AltPhone,
            AltPhone => Email,
            Email => {
                if class.is_wholesale() {
                    Company
                } else {
                    Address
                }
            }
            Company => TaxId,
            TaxId => Address,
            Address => City,
            City => return None,
        })
    }

    /// Prompt sent to the shopper when this sub-step begins.
    pub fn prompt(self) -> &'static str {
        use ProfileField::*;
        match self {
            Name => "Please share your full name.",
            AltPhone => "An alternate contact number, please.",
            Email => "Your email address?",
            Company => "Your company or firm name?",
            TaxId => "Your GST number, please.",
            Address => "Your full postal address?",
            City => "And finally, your city?",
        }
    }
}

/// Collected contact details. Each field is write-once per collection cycle
/// and only cleared by a flow restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Profile {
    pub name: Option<String>,
    pub alt_phone: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
}

impl Profile {
    pub fn set(&mut self, field: ProfileField, value: String) {
        let slot = match field {
            ProfileField::Name => &mut self.name,
            ProfileField::AltPhone => &mut self.alt_phone,
            ProfileField::Email => &mut self.email,
            ProfileField::Company => &mut self.company,
            ProfileField::TaxId => &mut self.tax_id,
            ProfileField::Address => &mut self.address,
            ProfileField::City => &mut self.city,
        };
        *slot = Some(value);
    }

    pub fn is_empty(&self) -> bool {
        *self == Profile::default()
    }
}

/// One line of the shopper's cart, taken from the messaging client's
/// structured order payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub product_retailer_id: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub currency: String,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Sum of `quantity * unit_price` over the cart.
pub fn cart_total(cart: &[CartLine]) -> Decimal {
    cart.iter().map(CartLine::line_total).sum()
}

/// Payment-link details held while a wholesale order awaits payment.
///
/// Present if and only if the session step is `AwaitingPayment`. The order id
/// is the sole join key to asynchronous payment notifications and is never
/// reused across carts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PendingOrder {
    pub order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_link_id: String,
    pub payment_url: String,
    pub created_at: DateTime<Utc>,
}

/// Final disposition of a session. `Paid` is set at most once and never
/// overwritten; a later failure notification for the same order must no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Paid,
    Failed,
    Abandoned,
}

/// Where the shopper currently is in the conversation.
///
/// Absence of a session is the implicit `New` state and is handled by the
/// store, not by a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStep {
    Greeted,
    BrowsingCatalog,
    AskingCustomType,
    CollectingProfile(ProfileField),
    AwaitingPayment,
    Confirmed,
}

/// Per-phone conversation state. The session store is the source of truth
/// for a conversation while it is live; the ledger row is a side-effect copy.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub phone: String,
    pub step: ConversationStep,
    pub customer_class: CustomerClass,
    pub profile: Profile,
    pub cart: Vec<CartLine>,
    pub pending_order: Option<PendingOrder>,
    pub terminal_status: Option<TerminalStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(phone: String) -> Self {
        let now = Utc::now();
        Self {
            phone,
            step: ConversationStep::Greeted,
            customer_class: CustomerClass::Unknown,
            profile: Profile::default(),
            cart: Vec::new(),
            pending_order: None,
            terminal_status: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn cart_total(&self) -> Decimal {
        cart_total(&self.cart)
    }
}

/// Ledger row status. Mirrors the session's step/terminal status at the time
/// of each write; the ledger is a sink, never a source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    PaymentPending,
    Paid,
    PaymentFailed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::PaymentPending => "payment_pending",
            OrderStatus::Paid => "paid",
            OrderStatus::PaymentFailed => "payment_failed",
        }
    }
}

/// The durable row appended to the ledger when an order is finalized.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderRecord {
    pub order_id: String,
    pub phone: String,
    pub customer_class: CustomerClass,
    pub customer_name: String,
    pub email: String,
    pub address: String,
    pub city: String,
    /// Cart flattened to a human-readable summary, one segment per line item.
    pub items: String,
    pub total: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub placed_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn from_session(order_id: &str, session: &Session, status: OrderStatus) -> Self {
        let items = session
            .cart
            .iter()
            .map(|l| format!("{} x{} @ {}", l.product_retailer_id, l.quantity, l.unit_price))
            .collect::<Vec<_>>()
            .join("; ");
        let currency = session
            .cart
            .first()
            .map(|l| l.currency.clone())
            .unwrap_or_else(|| "INR".to_string());
        Self {
            order_id: order_id.to_string(),
            phone: session.phone.clone(),
            customer_class: session.customer_class,
            customer_name: session.profile.name.clone().unwrap_or_default(),
            email: session.profile.email.clone().unwrap_or_default(),
            address: session.profile.address.clone().unwrap_or_default(),
            city: session.profile.city.clone().unwrap_or_default(),
            items,
            total: session.cart_total(),
            currency,
            status,
            placed_at: Utc::now(),
        }
    }
}

/// Inbound message kinds the core understands. Anything else is dropped at
/// the handler boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InboundKind {
    Text(String),
    ButtonReply { id: String, title: String },
    ListReply { id: String, title: String },
    CartOrder(Vec<CartLine>),
}

/// A normalized inbound message event. The raw provider envelope is parsed
/// once at the webhook handler; the engines only ever see this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub phone: String,
    pub kind: InboundKind,
}

/// Directory lookup result for a known customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerProfile {
    pub display_name: String,
    pub class: CustomerClass,
}

/// A hosted payment link issued by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLink {
    pub link_id: String,
    pub url: String,
}

/// Outcome carried by a payment notification, either channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid,
    Failed,
}
