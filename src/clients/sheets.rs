//! Google Sheets ledger sink. Appends one row per finalized order and can
//! later rewrite that row's status cell. Only ever driven by the event
//! worker; nothing in the conversation or reconciliation path waits on it.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::{instrument, warn};

use crate::config::SheetsConfig;
use crate::errors::ServiceError;
use crate::models::{OrderRecord, OrderStatus};

use super::LedgerSink;

/// Column holding the status field in the orders range (A:L row layout:
/// order id, phone, class, name, email, address, city, items, total,
/// currency, status, placed at).
const STATUS_COLUMN: &str = "K";

pub struct SheetsLedger {
    http: reqwest::Client,
    config: SheetsConfig,
    /// Row number each order id landed on, learned from append responses.
    rows: DashMap<String, u32>,
}

impl SheetsLedger {
    pub fn new(http: reqwest::Client, config: SheetsConfig) -> Self {
        Self {
            http,
            config,
            rows: DashMap::new(),
        }
    }

    fn sheet_name(&self) -> &str {
        self.config
            .orders_range
            .split('!')
            .next()
            .unwrap_or("Orders")
    }
}

fn record_row(record: &OrderRecord) -> Vec<Value> {
    vec![
        json!(record.order_id),
        json!(record.phone),
        json!(format!("{:?}", record.customer_class).to_lowercase()),
        json!(record.customer_name),
        json!(record.email),
        json!(record.address),
        json!(record.city),
        json!(record.items),
        json!(record.total.to_string()),
        json!(record.currency),
        json!(record.status.as_str()),
        json!(record.placed_at.to_rfc3339()),
    ]
}

/// Pulls the row number out of an A1-notation range like `Orders!A7:L7`.
fn row_from_range(range: &str) -> Option<u32> {
    let cell = range.split('!').nth(1)?.split(':').next()?;
    let digits: String = cell.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[async_trait]
impl LedgerSink for SheetsLedger {
    #[instrument(skip(self, record), fields(order_id = %record.order_id))]
    async fn append_order(&self, record: &OrderRecord) -> Result<(), ServiceError> {
        let url = format!(
            "{}/spreadsheets/{}/values/{}:append",
            self.config.api_base, self.config.spreadsheet_id, self.config.orders_range
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&json!({ "values": [record_row(record)] }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "sheets append failed: {}",
                response.status()
            )));
        }
        let body: Value = response.json().await?;
        match body
            .get("updates")
            .and_then(|u| u.get("updatedRange"))
            .and_then(|r| r.as_str())
            .and_then(row_from_range)
        {
            Some(row) => {
                self.rows.insert(record.order_id.clone(), row);
            }
            None => warn!(
                order_id = %record.order_id,
                "append response carried no usable range; status updates for this order will be skipped"
            ),
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), ServiceError> {
        let Some(row) = self.rows.get(order_id).map(|r| *r) else {
            return Err(ServiceError::NotFound(format!(
                "no ledger row recorded for order {}",
                order_id
            )));
        };
        let range = format!("{}!{}{}", self.sheet_name(), STATUS_COLUMN, row);
        let url = format!(
            "{}/spreadsheets/{}/values/{}",
            self.config.api_base, self.config.spreadsheet_id, range
        );
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.config.access_token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&json!({ "values": [[status.as_str()]] }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "sheets status update failed: {}",
                response.status()
            )));
        }
        Ok(())
    }
}
