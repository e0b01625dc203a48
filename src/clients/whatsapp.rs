//! WhatsApp Cloud API client: outbound message senders and the inbound
//! envelope extraction that normalizes webhook bodies into [`InboundEvent`]s.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::config::WhatsAppConfig;
use crate::errors::ServiceError;
use crate::models::{normalize_phone, CartLine, InboundEvent, InboundKind};

use super::{Button, ListSection, MessagingGateway};

pub struct WhatsAppGateway {
    http: reqwest::Client,
    config: WhatsAppConfig,
}

impl WhatsAppGateway {
    pub fn new(http: reqwest::Client, config: WhatsAppConfig) -> Self {
        Self { http, config }
    }

    async fn send(&self, to: &str, payload: Value) -> Result<(), ServiceError> {
        let url = format!(
            "{}/{}/messages",
            self.config.api_base, self.config.phone_number_id
        );
        let mut body = payload;
        body["messaging_product"] = json!("whatsapp");
        body["to"] = json!(to);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "whatsapp send failed ({}): {}",
                status, text
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingGateway for WhatsAppGateway {
    #[instrument(skip(self, body))]
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ServiceError> {
        self.send(to, json!({ "type": "text", "text": { "body": body } }))
            .await
    }

    #[instrument(skip(self, body, buttons))]
    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: &[Button],
    ) -> Result<(), ServiceError> {
        let buttons: Vec<Value> = buttons
            .iter()
            .map(|b| json!({ "type": "reply", "reply": { "id": b.id, "title": b.title } }))
            .collect();
        self.send(
            to,
            json!({
                "type": "interactive",
                "interactive": {
                    "type": "button",
                    "body": { "text": body },
                    "action": { "buttons": buttons }
                }
            }),
        )
        .await
    }

    #[instrument(skip(self, body, sections))]
    async fn send_list(
        &self,
        to: &str,
        header: &str,
        body: &str,
        sections: &[ListSection],
    ) -> Result<(), ServiceError> {
        let sections: Vec<Value> = sections
            .iter()
            .map(|s| {
                let rows: Vec<Value> = s
                    .rows
                    .iter()
                    .map(|r| {
                        json!({
                            "id": r.id,
                            "title": r.title,
                            "description": r.description.clone().unwrap_or_default()
                        })
                    })
                    .collect();
                json!({ "title": s.title, "rows": rows })
            })
            .collect();
        self.send(
            to,
            json!({
                "type": "interactive",
                "interactive": {
                    "type": "list",
                    "header": { "type": "text", "text": header },
                    "body": { "text": body },
                    "action": { "button": "Choose", "sections": sections }
                }
            }),
        )
        .await
    }

    #[instrument(skip(self, body, url))]
    async fn send_link_button(
        &self,
        to: &str,
        body: &str,
        label: &str,
        url: &str,
    ) -> Result<(), ServiceError> {
        self.send(
            to,
            json!({
                "type": "interactive",
                "interactive": {
                    "type": "cta_url",
                    "body": { "text": body },
                    "action": {
                        "name": "cta_url",
                        "parameters": { "display_text": label, "url": url }
                    }
                }
            }),
        )
        .await
    }

    #[instrument(skip(self, body))]
    async fn send_catalog(&self, to: &str, body: &str) -> Result<(), ServiceError> {
        let mut parameters = json!({});
        if let Some(thumb) = &self.config.catalog_thumbnail_product_id {
            parameters["thumbnail_product_retailer_id"] = json!(thumb);
        }
        self.send(
            to,
            json!({
                "type": "interactive",
                "interactive": {
                    "type": "catalog_message",
                    "body": { "text": body },
                    "action": { "name": "catalog_message", "parameters": parameters }
                }
            }),
        )
        .await
    }
}

/// Extracts a normalized inbound event from a webhook delivery body.
///
/// Returns `None` for anything that is not a user message the core
/// understands: status-only deliveries (sent/delivered/read receipts),
/// unknown message types, or envelopes missing expected fields. Those are
/// acknowledged upstream and dropped.
pub fn extract_inbound_event(body: &Value) -> Option<InboundEvent> {
    let value = body
        .get("entry")?
        .get(0)?
        .get("changes")?
        .get(0)?
        .get("value")?;

    // Deliveries that only carry status updates have no "messages" array.
    let message = value.get("messages")?.get(0)?;
    let raw_phone = value
        .get("contacts")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("wa_id"))
        .and_then(|v| v.as_str())
        .or_else(|| message.get("from").and_then(|v| v.as_str()))?;
    let phone = normalize_phone(raw_phone);
    if phone.is_empty() {
        return None;
    }

    let kind = match message.get("type").and_then(|v| v.as_str())? {
        "text" => InboundKind::Text(
            message
                .get("text")?
                .get("body")?
                .as_str()?
                .trim()
                .to_string(),
        ),
        "interactive" => {
            let interactive = message.get("interactive")?;
            if let Some(reply) = interactive.get("button_reply") {
                InboundKind::ButtonReply {
                    id: reply.get("id")?.as_str()?.to_string(),
                    title: reply
                        .get("title")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                }
            } else if let Some(reply) = interactive.get("list_reply") {
                InboundKind::ListReply {
                    id: reply.get("id")?.as_str()?.to_string(),
                    title: reply
                        .get("title")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                }
            } else {
                debug!("unhandled interactive reply shape");
                return None;
            }
        }
        // Template-message quick replies arrive as a legacy "button" type.
        "button" => InboundKind::ButtonReply {
            id: message.get("button")?.get("payload")?.as_str()?.to_string(),
            title: message
                .get("button")
                .and_then(|b| b.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        },
        "order" => {
            let items = message.get("order")?.get("product_items")?.as_array()?;
            let lines: Vec<CartLine> = items
                .iter()
                .filter_map(|item| {
                    Some(CartLine {
                        product_retailer_id: item
                            .get("product_retailer_id")?
                            .as_str()?
                            .to_string(),
                        quantity: item.get("quantity").and_then(json_to_u32)?,
                        unit_price: item.get("item_price").and_then(json_to_decimal)?,
                        currency: item
                            .get("currency")
                            .and_then(|v| v.as_str())
                            .unwrap_or("INR")
                            .to_string(),
                    })
                })
                .collect();
            if lines.is_empty() {
                return None;
            }
            InboundKind::CartOrder(lines)
        }
        other => {
            debug!(message_type = other, "ignoring unsupported message type");
            return None;
        }
    };

    Some(InboundEvent { phone, kind })
}

fn json_to_u32(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn json_to_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
