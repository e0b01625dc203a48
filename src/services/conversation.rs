//! The conversation state machine. Given a normalized inbound event and the
//! shopper's current session, decides the next step, what to persist, and
//! which outbound messages to request.
//!
//! Transitions are a total function of (step, event): any pair without an
//! arm below is a logged no-op, never a user-visible error.

use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::clients::{Button, CustomerDirectory, MessagingGateway, PaymentLinks};
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    ConversationStep, CustomerClass, InboundEvent, InboundKind, OrderRecord, OrderStatus,
    PendingOrder, ProfileField, Session,
};
use crate::sessions::{SessionSlot, SessionStore};

/// Case-insensitive keywords that reset any conversation back to the
/// greeting. This is a deliberate escape hatch for stuck shoppers.
const GREETING_KEYWORDS: &[&str] = &["hi", "hello", "hey", "menu", "start", "namaste"];

// Quick-reply button ids.
const BTN_CUSTOM_YES: &str = "custom_yes";
const BTN_CUSTOM_NO: &str = "custom_no";
const BTN_CLASS_WHOLESALE: &str = "class_wholesale";
const BTN_CLASS_RETAIL: &str = "class_retail";
const BTN_RETRY_CHECKOUT: &str = "retry_checkout";

pub fn is_greeting(text: &str) -> bool {
    let text = text.trim().to_lowercase();
    GREETING_KEYWORDS.iter().any(|k| *k == text)
}

pub struct ConversationEngine {
    sessions: Arc<SessionStore>,
    directory: Arc<dyn CustomerDirectory>,
    messaging: Arc<dyn MessagingGateway>,
    payment_links: Arc<dyn PaymentLinks>,
    events: EventSender,
    config: Arc<AppConfig>,
}

/// Outbound delivery is best-effort; a failed send never rolls back the
/// transition that requested it.
fn log_send(result: Result<(), ServiceError>) {
    if let Err(e) = result {
        warn!("outbound message failed: {}", e);
    }
}

impl ConversationEngine {
    pub fn new(
        sessions: Arc<SessionStore>,
        directory: Arc<dyn CustomerDirectory>,
        messaging: Arc<dyn MessagingGateway>,
        payment_links: Arc<dyn PaymentLinks>,
        events: EventSender,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            sessions,
            directory,
            messaging,
            payment_links,
            events,
            config,
        }
    }

    /// Applies one inbound event under the shopper's session lock.
    #[instrument(skip(self, event), fields(phone = %event.phone))]
    pub async fn handle(&self, event: InboundEvent) {
        let mut guard = self.sessions.lock(&event.phone).await;

        // Greetings reset unconditionally, from any step.
        if let InboundKind::Text(text) = &event.kind {
            if is_greeting(text) {
                self.restart(&event.phone, &mut guard).await;
                return;
            }
        }

        // First contact with a non-greeting message starts the flow too.
        if guard.session.is_none() {
            self.restart(&event.phone, &mut guard).await;
            if matches!(event.kind, InboundKind::CartOrder(_)) {
                self.dispatch(&event, &mut guard).await;
            }
            return;
        }

        self.dispatch(&event, &mut guard).await;
    }

    async fn dispatch(&self, event: &InboundEvent, guard: &mut OwnedMutexGuard<SessionSlot>) {
        let step = match &guard.session {
            Some(s) => s.step,
            None => return,
        };
        match (&event.kind, step) {
            (InboundKind::CartOrder(lines), ConversationStep::BrowsingCatalog)
            | (InboundKind::CartOrder(lines), ConversationStep::AskingCustomType) => {
                self.accept_cart(lines.clone(), guard).await;
            }
            (InboundKind::ButtonReply { id, .. }, ConversationStep::AskingCustomType)
            | (InboundKind::ListReply { id, .. }, ConversationStep::AskingCustomType) => {
                self.handle_choice(id.clone(), guard).await;
            }
            (InboundKind::Text(text), ConversationStep::CollectingProfile(field)) => {
                self.collect_profile_answer(field, text.clone(), guard).await;
            }
            (kind, step) => {
                debug!(?step, ?kind, "no transition declared; ignoring event");
            }
        }
    }

    /// Discards any prior session state and starts over from the greeting:
    /// directory lookup, then either the catalog (wholesale) or the
    /// custom-jewelry question (everyone else).
    async fn restart(&self, phone: &str, guard: &mut OwnedMutexGuard<SessionSlot>) {
        if let Some(pending) = guard
            .session
            .as_ref()
            .and_then(|s| s.pending_order.as_ref())
        {
            // A reset abandons the pending order; late notifications for it
            // must no-op, so drop its routing entry now.
            self.sessions.unbind_order(&pending.order_id);
        }
        let mut session = Session::new(phone.to_string());

        let looked_up = match self.directory.lookup(phone).await {
            Ok(found) => found,
            Err(e) => {
                // Fail open: a directory outage must not block the shopper.
                warn!("customer directory lookup failed, defaulting to retail flow: {}", e);
                None
            }
        };

        match looked_up {
            Some(profile) if profile.class.is_wholesale() => {
                session.customer_class = CustomerClass::Wholesale;
                session.step = ConversationStep::BrowsingCatalog;
                log_send(
                    self.messaging
                        .send_catalog(phone, "Browse our jewellery collection below 👇")
                        .await,
                );
            }
            Some(profile) => {
                session.customer_class = profile.class;
                session.step = ConversationStep::AskingCustomType;
                self.ask_custom_question(phone).await;
            }
            None => {
                session.customer_class = CustomerClass::Unknown;
                session.step = ConversationStep::AskingCustomType;
                log_send(
                    self.messaging
                        .send_link_button(
                            phone,
                            "Welcome! Please register to shop with us.",
                            "Sign Up",
                            &self.config.shopify.registration_url(),
                        )
                        .await,
                );
                self.ask_custom_question(phone).await;
            }
        }

        session.touch();
        guard.session = Some(session);
    }

    async fn ask_custom_question(&self, phone: &str) {
        log_send(
            self.messaging
                .send_buttons(
                    phone,
                    "Would you like custom jewellery made for you?",
                    &[Button::new(BTN_CUSTOM_YES, "Yes"), Button::new(BTN_CUSTOM_NO, "No")],
                )
                .await,
        );
    }

    /// A finalized cart from the messaging client. Only accepted while no
    /// checkout is in flight; classification is (re)confirmed before the
    /// profile is collected because pricing and flow differ by class.
    async fn accept_cart(
        &self,
        lines: Vec<crate::models::CartLine>,
        guard: &mut OwnedMutexGuard<SessionSlot>,
    ) {
        let Some(session) = guard.session.as_mut() else {
            return;
        };
        session.cart.extend(lines);
        session.step = ConversationStep::AskingCustomType;
        session.touch();
        let total = session.cart_total();
        let phone = session.phone.clone();
        info!(%total, "cart received");
        log_send(
            self.messaging
                .send_text(&phone, &format!("Total Amount: ₹{}", total))
                .await,
        );
        log_send(
            self.messaging
                .send_buttons(
                    &phone,
                    "Are you buying wholesale or retail?",
                    &[
                        Button::new(BTN_CLASS_WHOLESALE, "Wholesale"),
                        Button::new(BTN_CLASS_RETAIL, "Retail"),
                    ],
                )
                .await,
        );
    }

    async fn handle_choice(&self, id: String, guard: &mut OwnedMutexGuard<SessionSlot>) {
        let (phone, cart_empty, ready_to_retry) = match guard.session.as_ref() {
            Some(s) => (
                s.phone.clone(),
                s.cart.is_empty(),
                s.customer_class.is_wholesale() && s.profile.city.is_some(),
            ),
            None => return,
        };
        match id.as_str() {
            BTN_CUSTOM_YES => {
                log_send(
                    self.messaging
                        .send_link_button(
                            &phone,
                            "Book a consultation below 👇",
                            "Book Now",
                            &self.config.shopify.consultation_url(),
                        )
                        .await,
                );
            }
            BTN_CUSTOM_NO => {
                if let Some(session) = guard.session.as_mut() {
                    session.step = ConversationStep::BrowsingCatalog;
                    session.touch();
                }
                log_send(
                    self.messaging
                        .send_catalog(&phone, "Browse our jewellery collection below 👇")
                        .await,
                );
            }
            BTN_CLASS_WHOLESALE | BTN_CLASS_RETAIL if !cart_empty => {
                if let Some(session) = guard.session.as_mut() {
                    session.customer_class = if id == BTN_CLASS_WHOLESALE {
                        CustomerClass::Wholesale
                    } else {
                        CustomerClass::Retail
                    };
                    session.step = ConversationStep::CollectingProfile(ProfileField::Name);
                    session.touch();
                }
                log_send(
                    self.messaging
                        .send_text(&phone, ProfileField::Name.prompt())
                        .await,
                );
            }
            BTN_RETRY_CHECKOUT => {
                // Re-runs checkout after a payment-link creation failure.
                if ready_to_retry {
                    self.finalize(guard).await;
                } else {
                    debug!("retry tapped with no completed wholesale checkout; ignoring");
                }
            }
            other => {
                debug!(button = other, "unknown choice id; ignoring");
            }
        }
    }

    /// One free-text reply answers exactly one profile sub-step; the order
    /// of sub-steps is fixed and never skipped or repeated within a cycle.
    async fn collect_profile_answer(
        &self,
        field: ProfileField,
        answer: String,
        guard: &mut OwnedMutexGuard<SessionSlot>,
    ) {
        let Some(session) = guard.session.as_mut() else {
            return;
        };
        let answer = answer.trim().to_string();
        if answer.is_empty() {
            let phone = session.phone.clone();
            log_send(self.messaging.send_text(&phone, field.prompt()).await);
            return;
        }
        session.profile.set(field, answer);
        session.touch();
        let next = field.next(session.customer_class);
        let phone = session.phone.clone();
        match next {
            Some(next) => {
                session.step = ConversationStep::CollectingProfile(next);
                log_send(self.messaging.send_text(&phone, next.prompt()).await);
            }
            None => self.finalize(guard).await,
        }
    }

    /// Checkout at the end of profile collection. Retail orders terminate
    /// here; wholesale orders get a payment link and wait for the gateway.
    async fn finalize(&self, guard: &mut OwnedMutexGuard<SessionSlot>) {
        let Some(session) = guard.session.as_mut() else {
            return;
        };
        let phone = session.phone.clone();

        if !session.customer_class.is_wholesale() {
            let order_id = Uuid::new_v4().to_string();
            let record = OrderRecord::from_session(&order_id, session, OrderStatus::New);
            info!(%order_id, "retail order confirmed");
            self.events.send(Event::OrderPlaced(record)).await;
            session.step = ConversationStep::Confirmed;
            log_send(
                self.messaging
                    .send_text(
                        &phone,
                        "Thank you! Your order is confirmed. Our team will reach out shortly. 💎",
                    )
                    .await,
            );
            self.sessions.retire(&phone, guard);
            return;
        }

        // Fresh order id per checkout attempt cycle; never reused across
        // carts. It is the sole join key for payment notifications.
        let order_id = Uuid::new_v4().to_string();
        let amount = session.cart_total();
        let currency = session
            .cart
            .first()
            .map(|l| l.currency.clone())
            .unwrap_or_else(|| self.config.currency.clone());
        let payee_name = session.profile.name.clone().unwrap_or_default();

        match self
            .payment_links
            .create_link(amount, &currency, &order_id, &payee_name, &phone)
            .await
        {
            Ok(link) => {
                session.pending_order = Some(PendingOrder {
                    order_id: order_id.clone(),
                    amount,
                    currency,
                    payment_link_id: link.link_id,
                    payment_url: link.url.clone(),
                    created_at: chrono::Utc::now(),
                });
                session.step = ConversationStep::AwaitingPayment;
                session.touch();
                self.sessions.bind_order(&order_id, &phone);
                let record =
                    OrderRecord::from_session(&order_id, session, OrderStatus::PaymentPending);
                info!(%order_id, %amount, "wholesale order awaiting payment");
                self.events.send(Event::OrderPlaced(record)).await;
                log_send(
                    self.messaging
                        .send_link_button(
                            &phone,
                            &format!("Total Amount: ₹{}", amount),
                            "Pay Now",
                            &link.url,
                        )
                        .await,
                );
            }
            Err(e) => {
                // No pending order exists, so the session must not sit in
                // AwaitingPayment; park it where checkout can be retried.
                warn!(%order_id, "payment link creation failed: {}", e);
                session.pending_order = None;
                session.step = ConversationStep::AskingCustomType;
                session.touch();
                log_send(
                    self.messaging
                        .send_buttons(
                            &phone,
                            "We couldn't set up your payment just now. Tap to retry.",
                            &[Button::new(BTN_RETRY_CHECKOUT, "Retry")],
                        )
                        .await,
                );
            }
        }
    }
}
