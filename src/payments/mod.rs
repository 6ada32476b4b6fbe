//! Gateway adapters: signature verification for inbound confirmations and
//! link/URL construction for outbound checkouts.
//!
//! Verifiers are pure. They never touch the store; they only turn a raw
//! gateway message into a [`Verification`] that the reconciliation
//! coordinator can act on.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::{
    domain::{OrderCode, PaymentMethod},
    error::{AppError, Result},
};

pub mod payos;
pub mod vnpay;

pub use payos::{PayosClient, PayosVerifier, PayosWebhook};
pub use vnpay::{VnpayGateway, VnpayVerifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gateway {
    /// Signed redirect URLs, browser return and IPN callbacks.
    Vnpay,
    /// Hosted checkout links and server webhooks.
    Payos,
}

impl Gateway {
    pub fn method(&self) -> PaymentMethod {
        match self {
            Gateway::Vnpay => PaymentMethod::Vnpay,
            Gateway::Payos => PaymentMethod::Payos,
        }
    }
}

/// Outcome of checking one inbound gateway message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub gateway: Gateway,
    pub valid: bool,
    pub order_code: Option<OrderCode>,
    pub result_code: Option<String>,
    pub success: bool,
    /// Amount the gateway reports, in the same minor units as `Payment.amount`.
    pub amount: Option<i64>,
}

impl Verification {
    pub fn invalid(gateway: Gateway) -> Self {
        Self {
            gateway,
            valid: false,
            order_code: None,
            result_code: None,
            success: false,
            amount: None,
        }
    }

    /// Normalizes a verification into the `(orderCode, success)` signal the
    /// coordinator consumes.
    pub fn into_signal(self) -> Result<GatewaySignal> {
        if !self.valid {
            return Err(AppError::InvalidSignature);
        }

        let order_code = self
            .order_code
            .ok_or_else(|| AppError::BadRequest("Missing order reference".to_string()))?;

        Ok(GatewaySignal {
            gateway: self.gateway,
            order_code,
            success: self.success,
            result_code: self.result_code.unwrap_or_default(),
            amount: self.amount,
        })
    }
}

/// A verified confirmation, ready for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySignal {
    pub gateway: Gateway,
    pub order_code: OrderCode,
    pub success: bool,
    pub result_code: String,
    pub amount: Option<i64>,
}

pub trait SignatureVerifier: Send + Sync {
    type Message: ?Sized;

    fn verify(&self, message: &Self::Message) -> Verification;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub order_code: OrderCode,
    pub amount: i64,
    pub description: String,
    pub return_url: String,
    pub cancel_url: String,
}

/// What the provider currently reports for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Paid { amount: i64 },
    Cancelled,
    Pending,
}

/// A gateway that issues hosted checkout links through an API call.
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    /// Makes a single create call. Implementations must not retry on
    /// transport failures: the provider may already hold the order.
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<String>;

    async fn fetch_status(&self, order_code: OrderCode) -> Result<ProviderStatus>;
}

pub(crate) fn hmac_sha512_hex(key: &[u8], message: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha512>::new_from_slice(key)
        .map_err(|_| AppError::Internal("Invalid HMAC key".to_string()))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub(crate) fn hmac_sha256_hex(key: &[u8], message: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|_| AppError::Internal("Invalid HMAC key".to_string()))?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Compares a lowercase hex digest against a supplied one, ignoring the
/// supplied digest's case.
pub(crate) fn digest_matches(expected_lower_hex: &str, supplied: &str) -> bool {
    let supplied = supplied.trim().to_ascii_lowercase();
    expected_lower_hex.as_bytes().ct_eq(supplied.as_bytes()).into()
}
