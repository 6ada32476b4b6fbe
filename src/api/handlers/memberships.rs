use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentAccount, state::AppState},
    domain::{Membership, Payment},
    error::Result,
};

pub async fn get(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Path(id): Path<Uuid>,
) -> Result<Json<Membership>> {
    let membership = state
        .service_context
        .membership_service
        .get(current.account_id, id)
        .await?;

    Ok(Json(membership))
}

/// Returns the pending payment to pay, opening a new one after a failed
/// attempt.
pub async fn open_payment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<Payment>)> {
    let payment = state
        .service_context
        .order_issuer
        .open_payment(current.account_id, id)
        .await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Payment>>> {
    let payments = state
        .service_context
        .order_issuer
        .payments_for_membership(current.account_id, id)
        .await?;

    Ok(Json(payments))
}

pub async fn lock(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Path(id): Path<Uuid>,
) -> Result<Json<Membership>> {
    let membership = state
        .service_context
        .membership_service
        .lock(current.account_id, id)
        .await?;

    Ok(Json(membership))
}

pub async fn unlock(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Path(id): Path<Uuid>,
) -> Result<Json<Membership>> {
    let membership = state
        .service_context
        .membership_service
        .unlock(current.account_id, id)
        .await?;

    Ok(Json(membership))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Path(id): Path<Uuid>,
) -> Result<Json<Membership>> {
    let membership = state
        .service_context
        .membership_service
        .remove(current.account_id, id)
        .await?;

    Ok(Json(membership))
}
