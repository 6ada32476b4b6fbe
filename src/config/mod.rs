use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub vnpay: VnpayConfig,
    #[serde(default)]
    pub payos: PayosConfig,
    pub pages: PagesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Shared HS256 secret of the account service that issues bearer tokens.
    pub jwt_secret: String,
}

/// Redirect/IPN gateway (HMAC-SHA-512 signed query strings).
#[derive(Debug, Deserialize, Clone)]
pub struct VnpayConfig {
    #[serde(default)]
    pub enabled: bool,
    pub tmn_code: Option<String>,
    pub hash_secret: Option<String>,
    #[serde(default = "default_vnpay_payment_url")]
    pub payment_url: String,
    pub return_url: Option<String>,
    #[serde(default = "default_vnpay_locale")]
    pub locale: String,
    #[serde(default = "default_vnpay_expire_minutes")]
    pub expire_minutes: i64,
}

/// Webhook gateway (hosted checkout links, HMAC-SHA-256 webhooks).
#[derive(Debug, Deserialize, Clone)]
pub struct PayosConfig {
    #[serde(default)]
    pub enabled: bool,
    pub client_id: Option<String>,
    pub api_key: Option<String>,
    pub checksum_key: Option<String>,
    #[serde(default = "default_payos_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_payos_checkout_base_url")]
    pub checkout_base_url: String,
    /// May contain `{order_code}`.
    pub return_url: Option<String>,
    /// May contain `{order_code}`.
    pub cancel_url: Option<String>,
}

/// Where payers land after a redirect-return has been reconciled.
#[derive(Debug, Deserialize, Clone)]
pub struct PagesConfig {
    pub success_url: String,
    pub failure_url: String,
    pub pending_url: String,
}

impl Default for VnpayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tmn_code: None,
            hash_secret: None,
            payment_url: default_vnpay_payment_url(),
            return_url: None,
            locale: default_vnpay_locale(),
            expire_minutes: default_vnpay_expire_minutes(),
        }
    }
}

impl Default for PayosConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            client_id: None,
            api_key: None,
            checksum_key: None,
            api_base_url: default_payos_api_base_url(),
            checkout_base_url: default_payos_checkout_base_url(),
            return_url: None,
            cancel_url: None,
        }
    }
}

fn default_vnpay_payment_url() -> String {
    "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string()
}

fn default_vnpay_locale() -> String {
    "vn".to_string()
}

fn default_vnpay_expire_minutes() -> i64 {
    15
}

fn default_payos_api_base_url() -> String {
    "https://api-merchant.payos.vn".to_string()
}

fn default_payos_checkout_base_url() -> String {
    "https://pay.payos.vn/web".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.base_url", "http://localhost:8080")?
            .set_default("database.url", "sqlite://clubhouse.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("auth.jwt_secret", "change-me-in-production")?
            .set_default("vnpay.enabled", false)?
            .set_default("payos.enabled", false)?
            .set_default("pages.success_url", "http://localhost:3000/payment/success")?
            .set_default("pages.failure_url", "http://localhost:3000/payment/failure")?
            .set_default("pages.pending_url", "http://localhost:3000/payment/pending")?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with CLUBHOUSE__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("CLUBHOUSE").separator("__"))

            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://clubhouse.db?mode=rwc".to_string(),
                max_connections: 10,
            },
            auth: AuthConfig {
                jwt_secret: "change-me-in-production".to_string(),
            },
            vnpay: VnpayConfig::default(),
            payos: PayosConfig::default(),
            pages: PagesConfig {
                success_url: "http://localhost:3000/payment/success".to_string(),
                failure_url: "http://localhost:3000/payment/failure".to_string(),
                pending_url: "http://localhost:3000/payment/pending".to_string(),
            },
        }
    }
}
