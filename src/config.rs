use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_WHATSAPP_API_BASE: &str = "https://graph.facebook.com/v20.0";
const DEFAULT_SHOPIFY_API_VERSION: &str = "2023-10";
const DEFAULT_RAZORPAY_API_BASE: &str = "https://api.razorpay.com/v1";
const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";
const DEFAULT_CURRENCY: &str = "INR";
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// WhatsApp Cloud API credentials and endpoints.
#[derive(Clone, Debug, Deserialize)]
pub struct WhatsAppConfig {
    /// Bearer token for the Graph API
    pub token: String,
    /// Business phone-number id messages are sent from
    pub phone_number_id: String,
    /// Token echoed back during webhook subscription verification
    pub verify_token: String,
    /// Product retailer id used as the catalog message thumbnail
    #[serde(default)]
    pub catalog_thumbnail_product_id: Option<String>,
    #[serde(default = "default_whatsapp_api_base")]
    pub api_base: String,
}

/// Shopify Admin API access for customer-directory lookups.
#[derive(Clone, Debug, Deserialize)]
pub struct ShopifyConfig {
    /// Store domain, e.g. `my-store.myshopify.com`
    pub store_domain: String,
    pub access_token: String,
    #[serde(default = "default_shopify_api_version")]
    pub api_version: String,
}

impl ShopifyConfig {
    pub fn registration_url(&self) -> String {
        format!("https://{}/account/register", self.store_domain)
    }

    pub fn consultation_url(&self) -> String {
        format!(
            "https://{}/products/custom-jewellery-consultation",
            self.store_domain
        )
    }
}

/// Razorpay payment-links API plus the secrets used to verify the two
/// inbound notification channels.
#[derive(Clone, Debug, Deserialize)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    /// Secret for the asynchronous webhook channel (HMAC over raw body)
    pub webhook_secret: String,
    #[serde(default = "default_razorpay_api_base")]
    pub api_base: String,
}

/// Google Sheets ledger target.
#[derive(Clone, Debug, Deserialize)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    /// OAuth bearer token for the Sheets API
    pub access_token: String,
    #[serde(default = "default_sheets_api_base")]
    pub api_base: String,
    #[serde(default = "default_sheet_range")]
    pub orders_range: String,
}

/// Application configuration, layered from `config/*.toml` and `APP__*`
/// environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,

    /// Currency used for payment links when the cart does not carry one
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Link sent to the shopper after a successful payment for retrieving
    /// the purchased digital receipt/asset
    #[serde(default)]
    pub receipt_base_url: Option<String>,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    pub whatsapp: WhatsAppConfig,
    pub shopify: ShopifyConfig,
    pub razorpay: RazorpayConfig,
    pub sheets: SheetsConfig,
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Retrieval link included in the payment-success message.
    pub fn receipt_url(&self, order_id: &str) -> String {
        match &self.receipt_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), order_id),
            None => format!("https://{}/pages/receipt?order={}", self.shopify.store_domain, order_id),
        }
    }

    fn validate(&self) -> Result<(), AppConfigError> {
        if self.event_channel_capacity == 0 {
            return Err(AppConfigError::Invalid(
                "event_channel_capacity must be greater than 0".into(),
            ));
        }
        if self.razorpay.webhook_secret.trim().is_empty() {
            return Err(AppConfigError::Invalid(
                "razorpay.webhook_secret must not be empty".into(),
            ));
        }
        if self.whatsapp.verify_token.trim().is_empty() {
            return Err(AppConfigError::Invalid(
                "whatsapp.verify_token must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}
fn default_whatsapp_api_base() -> String {
    DEFAULT_WHATSAPP_API_BASE.to_string()
}
fn default_shopify_api_version() -> String {
    DEFAULT_SHOPIFY_API_VERSION.to_string()
}
fn default_razorpay_api_base() -> String {
    DEFAULT_RAZORPAY_API_BASE.to_string()
}
fn default_sheets_api_base() -> String {
    DEFAULT_SHEETS_API_BASE.to_string()
}
fn default_sheet_range() -> String {
    "Orders!A:L".to_string()
}

/// Initializes tracing using the configured log level as the default filter.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("jewelbot_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration.
///
/// Layers configuration sources in this order:
/// 1. Default config (config/default.toml)
/// 2. Environment-specific config (config/{env}.toml)
/// 3. Environment variables (APP__*, `__` as section separator)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {}", e);
        e
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
