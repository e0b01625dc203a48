//! Shopify Admin API customer lookup. The bot only uses Shopify as a
//! read-only customer directory: does this phone belong to a known account,
//! and is it tagged wholesale?

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

use crate::config::ShopifyConfig;
use crate::errors::ServiceError;
use crate::models::{phones_match, CustomerClass, CustomerProfile};

use super::CustomerDirectory;

const WHOLESALE_TAG: &str = "wholesale";

pub struct ShopifyDirectory {
    http: reqwest::Client,
    config: ShopifyConfig,
}

impl ShopifyDirectory {
    pub fn new(http: reqwest::Client, config: ShopifyConfig) -> Self {
        Self { http, config }
    }
}

#[derive(Debug, Deserialize)]
struct CustomerSearchResponse {
    #[serde(default)]
    customers: Vec<ShopifyCustomer>,
}

#[derive(Debug, Deserialize)]
struct ShopifyCustomer {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    tags: Option<String>,
}

impl ShopifyCustomer {
    fn display_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        );
        name.trim().to_string()
    }

    fn class(&self) -> CustomerClass {
        let tagged_wholesale = self
            .tags
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase()
            .split(',')
            .any(|t| t.trim() == WHOLESALE_TAG);
        if tagged_wholesale {
            CustomerClass::Wholesale
        } else {
            CustomerClass::Retail
        }
    }
}

#[async_trait]
impl CustomerDirectory for ShopifyDirectory {
    #[instrument(skip(self))]
    async fn lookup(&self, phone: &str) -> Result<Option<CustomerProfile>, ServiceError> {
        let url = format!(
            "https://{}/admin/api/{}/customers/search.json",
            self.config.store_domain, self.config.api_version
        );
        let response = self
            .http
            .get(&url)
            .header("X-Shopify-Access-Token", &self.config.access_token)
            .query(&[("query", format!("phone:{}", phone))])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "shopify customer search failed: {}",
                response.status()
            )));
        }
        let body: CustomerSearchResponse = response.json().await?;

        // The search endpoint is fuzzy; require an exact phone match.
        let matched = body
            .customers
            .into_iter()
            .find(|c| c.phone.as_deref().is_some_and(|p| phones_match(p, phone)));
        Ok(matched.map(|c| CustomerProfile {
            class: c.class(),
            display_name: c.display_name(),
        }))
    }
}
