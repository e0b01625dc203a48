//! Payment reconciliation: authenticates payment-gateway notifications and
//! drives the waiting session to its outcome exactly once.
//!
//! Two channels deliver the same fact independently (a synchronous browser
//! redirect and an asynchronous webhook), possibly both and possibly twice.
//! The first delivery to pass signature verification wins the terminal
//! transition under the session lock; every later one observes the applied
//! state and no-ops.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, info, instrument, warn};

use crate::clients::{MessagingGateway, PaymentLinks};
use crate::config::AppConfig;
use crate::events::{Event, EventSender};
use crate::models::{OrderStatus, PaymentOutcome, TerminalStatus};
use crate::sessions::SessionStore;

type HmacSha256 = Hmac<Sha256>;

/// Redirect-callback parameters as sent by the gateway after a hosted
/// payment page completes.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCallback {
    pub razorpay_payment_id: String,
    pub razorpay_payment_link_id: String,
    pub razorpay_payment_link_reference_id: String,
    pub razorpay_payment_link_status: String,
    pub razorpay_signature: String,
}

impl PaymentCallback {
    pub fn outcome(&self) -> PaymentOutcome {
        if self.razorpay_payment_link_status.eq_ignore_ascii_case("paid") {
            PaymentOutcome::Paid
        } else {
            PaymentOutcome::Failed
        }
    }
}

fn hmac_hex(secret: &str, payload: &[u8]) -> String {
    // HMAC accepts keys of any length; new_from_slice cannot fail.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Verifies the asynchronous webhook channel: hex HMAC-SHA256 over the raw
/// request body.
pub fn verify_webhook_signature(raw_body: &[u8], signature: &str, secret: &str) -> bool {
    constant_time_eq(&hmac_hex(secret, raw_body), signature)
}

/// Verifies the redirect-callback channel: hex HMAC-SHA256 over the
/// pipe-joined field set `payment_id|link_id|reference_id|status`.
pub fn verify_callback_signature(cb: &PaymentCallback, secret: &str) -> bool {
    let payload = [
        cb.razorpay_payment_id.as_str(),
        cb.razorpay_payment_link_id.as_str(),
        cb.razorpay_payment_link_reference_id.as_str(),
        cb.razorpay_payment_link_status.as_str(),
    ]
    .join("|");
    constant_time_eq(&hmac_hex(secret, payload.as_bytes()), &cb.razorpay_signature)
}

/// Pulls `(order id, outcome)` out of a webhook event body. Returns `None`
/// for event types the bot does not react to.
pub fn parse_webhook_event(body: &Value) -> Option<(String, PaymentOutcome)> {
    let event = body.get("event")?.as_str()?;
    let outcome = match event {
        "payment_link.paid" => PaymentOutcome::Paid,
        "payment_link.expired" | "payment_link.cancelled" | "payment.failed" => {
            PaymentOutcome::Failed
        }
        other => {
            debug!(event = other, "unhandled payment webhook event type");
            return None;
        }
    };
    let order_id = body
        .get("payload")?
        .get("payment_link")?
        .get("entity")?
        .get("reference_id")?
        .as_str()?
        .to_string();
    Some((order_id, outcome))
}

pub struct ReconciliationEngine {
    sessions: Arc<SessionStore>,
    messaging: Arc<dyn MessagingGateway>,
    payment_links: Arc<dyn PaymentLinks>,
    events: EventSender,
    config: Arc<AppConfig>,
}

impl ReconciliationEngine {
    pub fn new(
        sessions: Arc<SessionStore>,
        messaging: Arc<dyn MessagingGateway>,
        payment_links: Arc<dyn PaymentLinks>,
        events: EventSender,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            sessions,
            messaging,
            payment_links,
            events,
            config,
        }
    }

    /// Applies a verified payment outcome to the session that owns
    /// `order_id`. Idempotent: unknown or already-settled orders no-op.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, order_id: &str, outcome: PaymentOutcome) {
        let Some(phone) = self.sessions.resolve_order(order_id) else {
            info!(%order_id, "no session awaiting this order; treating as already handled");
            return;
        };
        let mut guard = self.sessions.lock(&phone).await;
        let Some(session) = guard.session.as_mut() else {
            info!(%order_id, "session gone before reconciliation; no-op");
            return;
        };
        if session.terminal_status == Some(TerminalStatus::Paid) {
            info!(%order_id, "order already paid; duplicate notification ignored");
            return;
        }
        let matches_pending = session
            .pending_order
            .as_ref()
            .is_some_and(|p| p.order_id == order_id);
        if !matches_pending {
            info!(%order_id, "order id does not match the session's pending order; no-op");
            return;
        }

        match outcome {
            PaymentOutcome::Paid => {
                session.terminal_status = Some(TerminalStatus::Paid);
                session.touch();
                info!(%order_id, "payment captured; session settled");
                self.events
                    .send(Event::OrderStatusChanged {
                        order_id: order_id.to_string(),
                        status: OrderStatus::Paid,
                    })
                    .await;
                if let Err(e) = self
                    .messaging
                    .send_link_button(
                        &phone,
                        "Payment Successful 🎉 Thank you for your order!",
                        "View Receipt",
                        &self.config.receipt_url(order_id),
                    )
                    .await
                {
                    warn!("success notification failed: {}", e);
                }
                self.sessions.retire(&phone, &mut guard);
            }
            PaymentOutcome::Failed => {
                // Failure is retryable, never terminal: issue a fresh link
                // for the same order and keep waiting.
                let (amount, currency) = session
                    .pending_order
                    .as_ref()
                    .map(|p| (p.amount, p.currency.clone()))
                    .unwrap_or((session.cart_total(), self.config.currency.clone()));
                let payee_name = session.profile.name.clone().unwrap_or_default();
                self.events
                    .send(Event::OrderStatusChanged {
                        order_id: order_id.to_string(),
                        status: OrderStatus::PaymentFailed,
                    })
                    .await;
                match self
                    .payment_links
                    .create_link(amount, &currency, order_id, &payee_name, &phone)
                    .await
                {
                    Ok(link) => {
                        if let Some(pending) = session.pending_order.as_mut() {
                            pending.payment_link_id = link.link_id;
                            pending.payment_url = link.url.clone();
                        }
                        session.touch();
                        info!(%order_id, "payment failed; reissued payment link");
                        if let Err(e) = self
                            .messaging
                            .send_link_button(
                                &phone,
                                "Payment not completed ❌ Tap below to retry.",
                                "Retry Payment",
                                &link.url,
                            )
                            .await
                        {
                            warn!("retry notification failed: {}", e);
                        }
                    }
                    Err(e) => {
                        warn!(%order_id, "could not reissue payment link: {}", e);
                        if let Err(e) = self
                            .messaging
                            .send_text(
                                &phone,
                                "Payment not completed ❌ Please use your payment link to try again.",
                            )
                            .await
                        {
                            warn!("retry notification failed: {}", e);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test_webhook_secret";

    #[test]
    fn webhook_signature_accepts_matching_hmac() {
        let body = br#"{"event":"payment_link.paid"}"#;
        let sig = hmac_hex(SECRET, body);
        assert!(verify_webhook_signature(body, &sig, SECRET));
    }

    #[test]
    fn webhook_signature_rejects_mismatch() {
        let body = br#"{"event":"payment_link.paid"}"#;
        let sig = hmac_hex(SECRET, body);
        assert!(!verify_webhook_signature(body, &sig, "other_secret"));
        assert!(!verify_webhook_signature(b"tampered", &sig, SECRET));
        assert!(!verify_webhook_signature(body, "", SECRET));
    }

    #[test]
    fn callback_signature_covers_pipe_joined_fields() {
        let mut cb = PaymentCallback {
            razorpay_payment_id: "pay_1".into(),
            razorpay_payment_link_id: "plink_1".into(),
            razorpay_payment_link_reference_id: "ord-1".into(),
            razorpay_payment_link_status: "paid".into(),
            razorpay_signature: String::new(),
        };
        cb.razorpay_signature = hmac_hex(SECRET, b"pay_1|plink_1|ord-1|paid");
        assert!(verify_callback_signature(&cb, SECRET));

        // Any flipped field invalidates the signature.
        cb.razorpay_payment_link_status = "failed".into();
        assert!(!verify_callback_signature(&cb, SECRET));
    }

    #[test]
    fn constant_time_eq_basic_properties() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn parses_paid_and_failed_webhook_events() {
        let body = json!({
            "event": "payment_link.paid",
            "payload": { "payment_link": { "entity": { "reference_id": "ord-7" } } }
        });
        assert_eq!(
            parse_webhook_event(&body),
            Some(("ord-7".into(), PaymentOutcome::Paid))
        );

        let body = json!({
            "event": "payment_link.expired",
            "payload": { "payment_link": { "entity": { "reference_id": "ord-7" } } }
        });
        assert_eq!(
            parse_webhook_event(&body),
            Some(("ord-7".into(), PaymentOutcome::Failed))
        );
    }

    #[test]
    fn unknown_webhook_event_is_skipped() {
        let body = json!({
            "event": "refund.processed",
            "payload": { "payment_link": { "entity": { "reference_id": "ord-7" } } }
        });
        assert_eq!(parse_webhook_event(&body), None);
        assert_eq!(parse_webhook_event(&json!({})), None);
    }
}
