//! Razorpay payment-links client. Amounts are converted to minor units at
//! this boundary; the rest of the system works in decimal major units.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::config::RazorpayConfig;
use crate::errors::ServiceError;
use crate::models::PaymentLink;

use super::PaymentLinks;

pub struct RazorpayLinks {
    http: reqwest::Client,
    config: RazorpayConfig,
}

impl RazorpayLinks {
    pub fn new(http: reqwest::Client, config: RazorpayConfig) -> Self {
        Self { http, config }
    }
}

#[derive(Debug, Deserialize)]
struct PaymentLinkResponse {
    id: String,
    short_url: String,
}

/// Converts a decimal major-unit amount to integral minor units (paise).
fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            ServiceError::InternalError(format!("payment amount out of range: {}", amount))
        })
}

#[async_trait]
impl PaymentLinks for RazorpayLinks {
    #[instrument(skip(self, payee_name))]
    async fn create_link(
        &self,
        amount: Decimal,
        currency: &str,
        order_id: &str,
        payee_name: &str,
        payee_contact: &str,
    ) -> Result<PaymentLink, ServiceError> {
        let url = format!("{}/payment_links", self.config.api_base);
        let body = json!({
            "amount": to_minor_units(amount)?,
            "currency": currency,
            "reference_id": order_id,
            "description": "Jewellery Order Payment",
            "customer": {
                "name": payee_name,
                "contact": payee_contact
            },
            "notify": { "sms": false, "email": false }
        });
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "razorpay link creation failed ({}): {}",
                status, text
            )));
        }
        let link: PaymentLinkResponse = response.json().await?;
        Ok(PaymentLink {
            link_id: link.id,
            url: link.short_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn minor_units_round_half_up_cases() {
        assert_eq!(to_minor_units(dec!(1500.50)).unwrap(), 150050);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
        assert_eq!(to_minor_units(dec!(999)).unwrap(), 99900);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        assert!(to_minor_units(dec!(0)).is_err());
        assert!(to_minor_units(dec!(-10)).is_err());
    }
}
