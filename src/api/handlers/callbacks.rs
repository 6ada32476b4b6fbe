//! Gateway callbacks. Each handler verifies what it receives, then hands the
//! signal to the reconciliation coordinator; none of them writes payment
//! state directly.

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    response::Redirect,
    Form, Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    api::state::AppState,
    domain::{OrderCode, PaymentStatus},
    error::AppError,
    payments::{
        payos::WebhookAck, vnpay::IpnResponse, Gateway, GatewaySignal, PayosWebhook,
        ProviderStatus, SignatureVerifier,
    },
    service::{Channel, Reconciliation},
};

enum Outcome {
    Success,
    Failure,
    Pending,
}

fn redirect_for(state: &AppState, outcome: Outcome, order_code: Option<OrderCode>) -> Redirect {
    let pages = &state.settings.pages;
    let base = match outcome {
        Outcome::Success => &pages.success_url,
        Outcome::Failure => &pages.failure_url,
        Outcome::Pending => &pages.pending_url,
    };

    let url = match order_code {
        Some(code) => {
            let separator = if base.contains('?') { '&' } else { '?' };
            format!("{}{}orderCode={}", base, separator, code)
        }
        None => base.clone(),
    };

    Redirect::to(&url)
}

fn outcome_of(result: &Result<Reconciliation, AppError>) -> Outcome {
    match result {
        Ok(r) if r.is_paid() => Outcome::Success,
        Ok(r) if r.payment.status == PaymentStatus::Pending => Outcome::Pending,
        Ok(_) => Outcome::Failure,
        Err(AppError::Database(_)) | Err(AppError::Internal(_)) => Outcome::Pending,
        Err(_) => Outcome::Failure,
    }
}

/// Browser return from the redirect gateway. Signed, so it may settle.
pub async fn vnpay_return(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Redirect {
    let Some(vnpay) = state.service_context.gateways.vnpay.as_ref() else {
        tracing::warn!("Redirect gateway return received but the gateway is disabled");
        return redirect_for(&state, Outcome::Failure, None);
    };

    let verification = vnpay.verifier().verify(&params);
    let order_code = verification.order_code;

    let signal = match verification.into_signal() {
        Ok(signal) => signal,
        Err(e) => {
            tracing::warn!("Rejected redirect return: {}", e);
            return redirect_for(&state, Outcome::Failure, order_code);
        }
    };

    let result = state
        .service_context
        .coordinator
        .reconcile(&signal, Channel::ReturnRedirect)
        .await;

    if let Err(e) = &result {
        tracing::warn!("Redirect return for order {} not reconciled: {}", signal.order_code, e);
    }

    redirect_for(&state, outcome_of(&result), Some(signal.order_code))
}

/// Server-to-server notification from the redirect gateway. The response
/// code tells the gateway whether to redeliver.
pub async fn vnpay_ipn(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Json<IpnResponse> {
    Json(settle_ipn(&state, &params).await)
}

/// The same notification delivered as a POST. Signed fields may arrive in a
/// form body, the query string, or both; body fields win.
pub async fn vnpay_ipn_form(
    State(state): State<AppState>,
    Query(mut params): Query<BTreeMap<String, String>>,
    form: Option<Form<BTreeMap<String, String>>>,
) -> Json<IpnResponse> {
    if let Some(Form(body)) = form {
        params.extend(body);
    }

    Json(settle_ipn(&state, &params).await)
}

async fn settle_ipn(state: &AppState, params: &BTreeMap<String, String>) -> IpnResponse {
    let Some(vnpay) = state.service_context.gateways.vnpay.as_ref() else {
        tracing::warn!("IPN received but the redirect gateway is disabled");
        return IpnResponse::unknown_error();
    };

    let signal = match vnpay.verifier().verify(params).into_signal() {
        Ok(signal) => signal,
        Err(e) => {
            tracing::warn!("Rejected IPN: {}", e);
            return IpnResponse::from_error(&e);
        }
    };

    match state
        .service_context
        .coordinator
        .reconcile(&signal, Channel::Ipn)
        .await
    {
        Ok(_) => IpnResponse::confirmed(),
        Err(e) => {
            tracing::warn!("IPN for order {} not reconciled: {}", signal.order_code, e);
            IpnResponse::from_error(&e)
        }
    }
}

/// Webhook from the hosted-checkout gateway. Always answered with HTTP 200;
/// the `error` field carries the verdict.
pub async fn payos_webhook(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Json<WebhookAck> {
    let Some(verifier) = state.service_context.gateways.payos_verifier.as_ref() else {
        tracing::warn!("Webhook received but the checkout gateway is disabled");
        return Json(WebhookAck::rejected());
    };

    let webhook: PayosWebhook = match serde_json::from_value(body) {
        Ok(webhook) => webhook,
        Err(e) => {
            tracing::warn!("Malformed webhook body: {}", e);
            return Json(WebhookAck::rejected());
        }
    };

    let signal = match verifier.verify(&webhook).into_signal() {
        Ok(signal) => signal,
        Err(e) => {
            tracing::warn!("Rejected webhook: {}", e);
            return Json(WebhookAck::rejected());
        }
    };

    match state
        .service_context
        .coordinator
        .reconcile(&signal, Channel::Webhook)
        .await
    {
        Ok(_) => Json(WebhookAck::ok()),
        // Verification pings from the gateway reference orders we never issued.
        Err(AppError::NotFound(_)) => {
            tracing::info!("Webhook for unknown order {} acknowledged", signal.order_code);
            Json(WebhookAck::ok())
        }
        Err(e) => {
            tracing::warn!("Webhook for order {} not reconciled: {}", signal.order_code, e);
            Json(WebhookAck::rejected())
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayosReturnParams {
    pub order_code: Option<String>,
    pub status: Option<String>,
    pub cancel: Option<String>,
}

/// Browser return from the hosted checkout. The query string is unsigned, so
/// the outcome comes from the gateway's status API instead.
pub async fn payos_return(
    State(state): State<AppState>,
    Query(params): Query<PayosReturnParams>,
) -> Redirect {
    let Some(order_code) = params.order_code.as_deref().and_then(OrderCode::parse) else {
        return redirect_for(&state, Outcome::Failure, None);
    };

    let Some(provider) = state.service_context.gateways.payos.as_ref() else {
        tracing::warn!("Checkout return received but the checkout gateway is disabled");
        return redirect_for(&state, Outcome::Pending, Some(order_code));
    };

    tracing::debug!(
        "Checkout return for order {} (status={:?}, cancel={:?}); polling gateway",
        order_code,
        params.status,
        params.cancel
    );

    let status = match provider.fetch_status(order_code).await {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!("Status poll for order {} failed: {}", order_code, e);
            return redirect_for(&state, Outcome::Pending, Some(order_code));
        }
    };

    let (success, amount) = match status {
        ProviderStatus::Paid { amount } => (true, Some(amount)),
        ProviderStatus::Cancelled => (false, None),
        ProviderStatus::Pending => return redirect_for(&state, Outcome::Pending, Some(order_code)),
    };

    let signal = GatewaySignal {
        gateway: Gateway::Payos,
        order_code,
        success,
        result_code: String::new(),
        amount,
    };

    let result = state
        .service_context
        .coordinator
        .reconcile(&signal, Channel::StatusPoll)
        .await;

    if let Err(e) = &result {
        tracing::warn!("Polled status for order {} not reconciled: {}", order_code, e);
    }

    redirect_for(&state, outcome_of(&result), Some(order_code))
}
