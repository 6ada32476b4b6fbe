//! Redirect/IPN gateway: every message is a flat set of `vnp_*` query
//! parameters signed with HMAC-SHA-512 over a canonical query string.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::Serialize;

use crate::{
    config::VnpayConfig,
    domain::OrderCode,
    error::{AppError, Result},
    payments::{digest_matches, hmac_sha512_hex, Gateway, SignatureVerifier, Verification},
};

pub const SECURE_HASH: &str = "vnp_SecureHash";
pub const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";

const VERSION: &str = "2.1.0";
const COMMAND_PAY: &str = "pay";
const CURRENCY: &str = "VND";
const ORDER_TYPE: &str = "other";
const SUCCESS_CODE: &str = "00";
/// Amounts travel multiplied by 100.
const AMOUNT_SCALE: i64 = 100;
/// Merchant timestamps are expressed in UTC+7.
const MERCHANT_UTC_OFFSET_SECS: i32 = 7 * 3600;

/// Builds the canonical string that gets signed: every pair except the
/// signature fields, sorted ordinally by key, form-urlencoded, `&`-joined.
pub fn canonical_query(params: &BTreeMap<String, String>) -> Result<String> {
    let pairs: Vec<(&str, &str)> = params
        .iter()
        .filter(|(key, _)| key.as_str() != SECURE_HASH && key.as_str() != SECURE_HASH_TYPE)
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();

    serde_urlencoded::to_string(pairs)
        .map_err(|e| AppError::Internal(format!("Failed to encode gateway parameters: {}", e)))
}

#[derive(Clone)]
pub struct VnpayVerifier {
    hash_secret: String,
}

impl VnpayVerifier {
    pub fn new(hash_secret: impl Into<String>) -> Self {
        Self {
            hash_secret: hash_secret.into(),
        }
    }

    fn signature_valid(&self, params: &BTreeMap<String, String>) -> bool {
        let Some(supplied) = params.get(SECURE_HASH) else {
            return false;
        };

        let expected = canonical_query(params)
            .and_then(|query| hmac_sha512_hex(self.hash_secret.as_bytes(), query.as_bytes()));

        match expected {
            Ok(expected) => digest_matches(&expected, supplied),
            Err(e) => {
                tracing::error!("Could not compute redirect signature: {}", e);
                false
            }
        }
    }
}

impl SignatureVerifier for VnpayVerifier {
    type Message = BTreeMap<String, String>;

    fn verify(&self, params: &BTreeMap<String, String>) -> Verification {
        if !self.signature_valid(params) {
            return Verification::invalid(Gateway::Vnpay);
        }

        let response_code = params.get("vnp_ResponseCode").map(String::as_str);
        let transaction_status = params.get("vnp_TransactionStatus").map(String::as_str);

        Verification {
            gateway: Gateway::Vnpay,
            valid: true,
            order_code: params.get("vnp_TxnRef").and_then(|r| OrderCode::parse(r)),
            result_code: response_code.map(str::to_string),
            success: response_code == Some(SUCCESS_CODE) && transaction_status == Some(SUCCESS_CODE),
            amount: params.get("vnp_Amount").map(String::as_str).and_then(scaled_amount),
        }
    }
}

/// `vnp_Amount` is the amount times [`AMOUNT_SCALE`]. Anything that does not
/// divide evenly is unreadable rather than rounded.
fn scaled_amount(raw: &str) -> Option<i64> {
    let raw = raw.parse::<i64>().ok()?;
    (raw % AMOUNT_SCALE == 0).then(|| raw / AMOUNT_SCALE)
}

/// Everything needed to sign one outbound payment URL.
#[derive(Debug, Clone)]
pub struct VnpayOrder {
    pub order_code: OrderCode,
    pub amount: i64,
    pub order_info: String,
    pub client_ip: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct VnpayGateway {
    tmn_code: String,
    payment_url: String,
    return_url: String,
    locale: String,
    expire_minutes: i64,
    verifier: VnpayVerifier,
    hash_secret: String,
}

impl VnpayGateway {
    pub fn new(config: &VnpayConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        match (&config.tmn_code, &config.hash_secret, &config.return_url) {
            (Some(tmn_code), Some(hash_secret), Some(return_url)) => Some(Self {
                tmn_code: tmn_code.clone(),
                payment_url: config.payment_url.clone(),
                return_url: return_url.clone(),
                locale: config.locale.clone(),
                expire_minutes: config.expire_minutes,
                verifier: VnpayVerifier::new(hash_secret.clone()),
                hash_secret: hash_secret.clone(),
            }),
            _ => {
                tracing::warn!("Redirect gateway enabled but tmn_code, hash_secret or return_url is missing");
                None
            }
        }
    }

    pub fn verifier(&self) -> &VnpayVerifier {
        &self.verifier
    }

    /// Serializes and signs the full parameter set into a redirect URL.
    /// No network call is involved.
    pub fn build_payment_url(&self, order: &VnpayOrder) -> Result<String> {
        let offset = FixedOffset::east_opt(MERCHANT_UTC_OFFSET_SECS)
            .ok_or_else(|| AppError::Internal("Invalid merchant UTC offset".to_string()))?;
        let created = order.created_at.with_timezone(&offset);
        let expires = created + Duration::minutes(self.expire_minutes);
        let scaled_amount = order
            .amount
            .checked_mul(AMOUNT_SCALE)
            .ok_or_else(|| AppError::BadRequest("Amount too large".to_string()))?;

        let mut params = BTreeMap::new();
        params.insert("vnp_Version".to_string(), VERSION.to_string());
        params.insert("vnp_Command".to_string(), COMMAND_PAY.to_string());
        params.insert("vnp_TmnCode".to_string(), self.tmn_code.clone());
        params.insert("vnp_Amount".to_string(), scaled_amount.to_string());
        params.insert("vnp_CurrCode".to_string(), CURRENCY.to_string());
        params.insert("vnp_TxnRef".to_string(), order.order_code.to_string());
        params.insert("vnp_OrderInfo".to_string(), sanitize_order_info(&order.order_info));
        params.insert("vnp_OrderType".to_string(), ORDER_TYPE.to_string());
        params.insert("vnp_Locale".to_string(), self.locale.clone());
        params.insert("vnp_ReturnUrl".to_string(), self.return_url.clone());
        params.insert("vnp_IpAddr".to_string(), order.client_ip.clone());
        params.insert("vnp_CreateDate".to_string(), created.format("%Y%m%d%H%M%S").to_string());
        params.insert("vnp_ExpireDate".to_string(), expires.format("%Y%m%d%H%M%S").to_string());

        let query = canonical_query(&params)?;
        let signature = hmac_sha512_hex(self.hash_secret.as_bytes(), query.as_bytes())?;

        Ok(format!("{}?{}&{}={}", self.payment_url, query, SECURE_HASH, signature))
    }
}

/// The gateway rejects order descriptions with diacritics or punctuation.
fn sanitize_order_info(info: &str) -> String {
    let cleaned: String = info
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// JSON body the gateway expects back from the IPN endpoint.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IpnResponse {
    #[serde(rename = "RspCode")]
    pub rsp_code: &'static str,
    #[serde(rename = "Message")]
    pub message: &'static str,
}

impl IpnResponse {
    pub const fn confirmed() -> Self {
        Self { rsp_code: "00", message: "Confirm Success" }
    }

    pub const fn order_not_found() -> Self {
        Self { rsp_code: "01", message: "Order not found" }
    }

    pub const fn invalid_amount() -> Self {
        Self { rsp_code: "04", message: "Invalid amount" }
    }

    pub const fn invalid_signature() -> Self {
        Self { rsp_code: "97", message: "Invalid signature" }
    }

    pub const fn unknown_error() -> Self {
        Self { rsp_code: "99", message: "Unknown error" }
    }

    /// Maps a reconciliation failure onto the gateway's response codes.
    /// Internal error text is never echoed back.
    pub fn from_error(err: &AppError) -> Self {
        match err {
            AppError::InvalidSignature => Self::invalid_signature(),
            AppError::NotFound(_) | AppError::BadRequest(_) => Self::order_not_found(),
            AppError::AmountMismatch { .. } => Self::invalid_amount(),
            _ => Self::unknown_error(),
        }
    }
}
