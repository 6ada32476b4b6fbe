use axum::{
    extract::{Extension, Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentAccount, state::AppState},
    payments::Gateway,
    service::{CheckoutLink, Reconciliation},
    error::Result,
};

#[derive(Debug, Deserialize)]
pub struct LinkBody {
    pub gateway: Gateway,
}

pub async fn create_link(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<LinkBody>,
) -> Result<Json<CheckoutLink>> {
    let client_ip = client_ip(&headers);

    let link = state
        .service_context
        .order_issuer
        .create_link(current.account_id, id, body.gateway, &client_ip)
        .await?;

    Ok(Json(link))
}

/// Leader records an offline (cash) payment.
pub async fn confirm(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reconciliation>> {
    let outcome = state
        .service_context
        .coordinator
        .confirm_manual(current.account_id, id)
        .await?;

    Ok(Json(outcome))
}

/// Payer address for the redirect gateway. Taken from the proxy headers;
/// falls back to loopback when the app is reached directly.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_prefers_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }

    #[test]
    fn client_ip_falls_back_to_loopback() {
        assert_eq!(client_ip(&HeaderMap::new()), "127.0.0.1");
    }
}
