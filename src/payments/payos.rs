//! Webhook gateway: hosted checkout links created through its merchant API,
//! outcomes pushed by signed webhooks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    config::PayosConfig,
    domain::OrderCode,
    error::{AppError, Result},
    payments::{
        digest_matches, hmac_sha256_hex, CheckoutProvider, CheckoutRequest, Gateway,
        ProviderStatus, SignatureVerifier, Verification,
    },
};

const SUCCESS_CODE: &str = "00";
const ORDER_EXISTS_CODE: &str = "231";
const MAX_DESCRIPTION_CHARS: usize = 25;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Inbound webhook envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayosWebhook {
    pub code: String,
    pub desc: String,
    #[serde(default)]
    pub success: bool,
    pub data: Map<String, Value>,
    pub signature: String,
}

/// Renders `data` the way the provider signs it: keys sorted, `key=value`
/// joined by `&`, nulls as empty strings and nested values as JSON.
pub fn signature_payload(data: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = data.keys().collect();
    keys.sort();

    keys.into_iter()
        .map(|key| {
            let value = match &data[key] {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                nested => nested.to_string(),
            };
            format!("{}={}", key, value)
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Clone)]
pub struct PayosVerifier {
    checksum_key: String,
}

impl PayosVerifier {
    pub fn new(checksum_key: impl Into<String>) -> Self {
        Self {
            checksum_key: checksum_key.into(),
        }
    }
}

impl SignatureVerifier for PayosVerifier {
    type Message = PayosWebhook;

    fn verify(&self, webhook: &PayosWebhook) -> Verification {
        let payload = signature_payload(&webhook.data);
        let valid = match hmac_sha256_hex(self.checksum_key.as_bytes(), payload.as_bytes()) {
            Ok(expected) => digest_matches(&expected, &webhook.signature),
            Err(e) => {
                tracing::error!("Could not compute webhook signature: {}", e);
                false
            }
        };

        if !valid {
            return Verification::invalid(Gateway::Payos);
        }

        let order_code = match webhook.data.get("orderCode") {
            Some(Value::Number(n)) => n.as_i64().and_then(OrderCode::new),
            Some(Value::String(s)) => OrderCode::parse(s),
            _ => None,
        };
        let result_code = webhook
            .data
            .get("code")
            .and_then(Value::as_str)
            .map(str::to_string);

        Verification {
            gateway: Gateway::Payos,
            valid: true,
            order_code,
            success: result_code.as_deref() == Some(SUCCESS_CODE),
            result_code,
            amount: webhook.data.get("amount").and_then(Value::as_i64),
        }
    }
}

/// Acknowledgement returned to the webhook sender, always with HTTP 200.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebhookAck {
    pub error: i32,
    pub message: &'static str,
}

impl WebhookAck {
    pub const fn ok() -> Self {
        Self { error: 0, message: "Ok" }
    }

    pub const fn rejected() -> Self {
        Self { error: -1, message: "Rejected" }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentLinkBody<'a> {
    order_code: i64,
    amount: i64,
    description: &'a str,
    return_url: &'a str,
    cancel_url: &'a str,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: String,
    desc: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedLink {
    checkout_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkInfo {
    id: String,
    amount: i64,
    status: String,
}

fn truncate_description(description: &str) -> String {
    description.chars().take(MAX_DESCRIPTION_CHARS).collect()
}

fn map_link_status(status: &str, amount: i64) -> ProviderStatus {
    match status {
        "PAID" => ProviderStatus::Paid { amount },
        "CANCELLED" | "EXPIRED" => ProviderStatus::Cancelled,
        _ => ProviderStatus::Pending,
    }
}

#[derive(Clone)]
pub struct PayosClient {
    client: Client,
    client_id: String,
    api_key: String,
    checksum_key: String,
    api_base_url: String,
    checkout_base_url: String,
    verifier: PayosVerifier,
}

impl PayosClient {
    pub fn new(config: &PayosConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        let (Some(client_id), Some(api_key), Some(checksum_key)) =
            (&config.client_id, &config.api_key, &config.checksum_key)
        else {
            tracing::warn!("Webhook gateway enabled but client_id, api_key or checksum_key is missing");
            return None;
        };

        let client = match Client::builder().timeout(REQUEST_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("Failed to build gateway HTTP client: {}", e);
                return None;
            }
        };

        Some(Self {
            client,
            client_id: client_id.clone(),
            api_key: api_key.clone(),
            checksum_key: checksum_key.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            checkout_base_url: config.checkout_base_url.trim_end_matches('/').to_string(),
            verifier: PayosVerifier::new(checksum_key.clone()),
        })
    }

    pub fn verifier(&self) -> &PayosVerifier {
        &self.verifier
    }

    /// Signature over the five fields of a payment-link request.
    pub fn payment_request_signature(&self, request: &CheckoutRequest, description: &str) -> Result<String> {
        let data = format!(
            "amount={}&cancelUrl={}&description={}&orderCode={}&returnUrl={}",
            request.amount, request.cancel_url, description, request.order_code, request.return_url
        );
        hmac_sha256_hex(self.checksum_key.as_bytes(), data.as_bytes())
    }

    async fn get_link(&self, order_code: OrderCode) -> Result<LinkInfo> {
        let response = self
            .client
            .get(format!("{}/v2/payment-requests/{}", self.api_base_url, order_code))
            .header("x-client-id", &self.client_id)
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::External(format!("Gateway status request failed: {}", e)))?
            .json::<ApiResponse<LinkInfo>>()
            .await
            .map_err(|e| AppError::External(format!("Invalid gateway status response: {}", e)))?;

        if response.code != SUCCESS_CODE {
            return Err(AppError::External(format!(
                "Gateway status lookup failed: {} {}",
                response.code, response.desc
            )));
        }

        response
            .data
            .ok_or_else(|| AppError::External("Gateway status response had no data".to_string()))
    }
}

#[async_trait]
impl CheckoutProvider for PayosClient {
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<String> {
        let description = truncate_description(&request.description);
        let body = CreatePaymentLinkBody {
            order_code: request.order_code.get(),
            amount: request.amount,
            description: &description,
            return_url: &request.return_url,
            cancel_url: &request.cancel_url,
            signature: self.payment_request_signature(request, &description)?,
        };

        let response = self
            .client
            .post(format!("{}/v2/payment-requests", self.api_base_url))
            .header("x-client-id", &self.client_id)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                // The provider may or may not have stored the order. A later
                // attempt for the same order code recovers the existing link.
                tracing::warn!(
                    "Checkout link request for order {} failed, not retrying: {}",
                    request.order_code,
                    e
                );
                AppError::External(format!("Gateway request failed: {}", e))
            })?
            .json::<ApiResponse<CreatedLink>>()
            .await
            .map_err(|e| AppError::External(format!("Invalid gateway response: {}", e)))?;

        match response.code.as_str() {
            SUCCESS_CODE => response
                .data
                .map(|d| d.checkout_url)
                .ok_or_else(|| AppError::External("No checkout URL returned".to_string())),
            ORDER_EXISTS_CODE => {
                let link = self.get_link(request.order_code).await?;
                if link.status != "PENDING" {
                    return Err(AppError::InvalidState(format!(
                        "Order {} is already {} at the gateway",
                        request.order_code, link.status
                    )));
                }
                tracing::info!("Reusing existing checkout link for order {}", request.order_code);
                Ok(format!("{}/{}", self.checkout_base_url, link.id))
            }
            code => Err(AppError::External(format!(
                "Gateway rejected checkout link: {} {}",
                code, response.desc
            ))),
        }
    }

    async fn fetch_status(&self, order_code: OrderCode) -> Result<ProviderStatus> {
        let link = self.get_link(order_code).await?;
        Ok(map_link_status(&link.status, link.amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CHECKSUM_KEY: &str = "PAYOSCHECKSUMKEY0123456789abcdef";
    const RECORDED_SIGNATURE: &str = "a7e98be0a21359a717ec961dd637f05268c6420697b07bba93a183bf0b6529a4";

    fn recorded_webhook() -> PayosWebhook {
        let data = json!({
            "orderCode": 172899000000042i64,
            "amount": 100000,
            "description": "CLB Guitar",
            "accountNumber": "12345678",
            "reference": "TF230204212323",
            "transactionDateTime": "2024-10-15 10:30:00",
            "currency": "VND",
            "paymentLinkId": "124c33293c43417ab7879e14c8d9eb18",
            "code": "00",
            "desc": "success",
            "counterAccountBankId": "",
            "counterAccountBankName": "",
            "counterAccountName": null,
            "counterAccountNumber": null,
            "virtualAccountName": null,
            "virtualAccountNumber": ""
        });

        PayosWebhook {
            code: "00".to_string(),
            desc: "success".to_string(),
            success: true,
            data: data.as_object().cloned().unwrap(),
            signature: RECORDED_SIGNATURE.to_string(),
        }
    }

    fn client() -> PayosClient {
        PayosClient::new(&PayosConfig {
            enabled: true,
            client_id: Some("client".to_string()),
            api_key: Some("key".to_string()),
            checksum_key: Some(CHECKSUM_KEY.to_string()),
            api_base_url: "https://api.example/".to_string(),
            checkout_base_url: "https://pay.example/web".to_string(),
            return_url: None,
            cancel_url: None,
        })
        .unwrap()
    }

    #[test]
    fn payload_sorts_keys_and_blanks_nulls() {
        let payload = signature_payload(&recorded_webhook().data);
        assert!(payload.starts_with("accountNumber=12345678&amount=100000&code=00"));
        assert!(payload.contains("&counterAccountName=&"));
        assert!(payload.ends_with("virtualAccountNumber="));
    }

    #[test]
    fn accepts_recorded_webhook_vector() {
        let verification = PayosVerifier::new(CHECKSUM_KEY).verify(&recorded_webhook());
        assert!(verification.valid);
        assert!(verification.success);
        assert_eq!(verification.order_code.map(OrderCode::get), Some(172899000000042));
        assert_eq!(verification.amount, Some(100000));
    }

    #[test]
    fn rejects_tampered_webhook() {
        let mut webhook = recorded_webhook();
        webhook.data.insert("amount".to_string(), json!(1000));
        assert!(!PayosVerifier::new(CHECKSUM_KEY).verify(&webhook).valid);

        let mut webhook = recorded_webhook();
        webhook.signature = "deadbeef".to_string();
        assert!(!PayosVerifier::new(CHECKSUM_KEY).verify(&webhook).valid);
    }

    #[test]
    fn failed_result_code_is_not_success() {
        let mut webhook = recorded_webhook();
        webhook.data.insert("code".to_string(), json!("01"));
        webhook.signature = hmac_sha256_hex(
            CHECKSUM_KEY.as_bytes(),
            signature_payload(&webhook.data).as_bytes(),
        )
        .unwrap();

        let verification = PayosVerifier::new(CHECKSUM_KEY).verify(&webhook);
        assert!(verification.valid);
        assert!(!verification.success);
        assert_eq!(verification.result_code.as_deref(), Some("01"));
    }

    #[test]
    fn payment_request_signature_matches_known_vector() {
        let request = CheckoutRequest {
            order_code: OrderCode::new(172899000000042).unwrap(),
            amount: 100000,
            description: "CLB Guitar".to_string(),
            return_url: "https://club.example/pay/return".to_string(),
            cancel_url: "https://club.example/pay/cancel".to_string(),
        };
        assert_eq!(
            client().payment_request_signature(&request, "CLB Guitar").unwrap(),
            "7662fefe1464c1319b0961bbc936f6cf2942de4157c1ebd5c073c90ca57f0f75"
        );
    }

    #[test]
    fn description_is_capped() {
        let long = "Membership fee for the Photography Society";
        assert_eq!(truncate_description(long).chars().count(), MAX_DESCRIPTION_CHARS);
        assert_eq!(truncate_description("CLB Guitar"), "CLB Guitar");
    }

    #[test]
    fn link_status_maps_to_settlement_outcomes() {
        assert_eq!(map_link_status("PAID", 5), ProviderStatus::Paid { amount: 5 });
        assert_eq!(map_link_status("CANCELLED", 5), ProviderStatus::Cancelled);
        assert_eq!(map_link_status("EXPIRED", 5), ProviderStatus::Cancelled);
        assert_eq!(map_link_status("PROCESSING", 5), ProviderStatus::Pending);
    }

    #[test]
    fn client_trims_base_urls() {
        let client = client();
        assert_eq!(client.api_base_url, "https://api.example");
        assert!(PayosClient::new(&PayosConfig::default()).is_none());
    }
}
