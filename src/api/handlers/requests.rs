use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    api::{middleware::auth::CurrentAccount, state::AppState},
    domain::{Membership, MembershipRequest, Payment, RequestStatus},
    error::Result,
};

#[derive(Debug, Default, Deserialize, Validate)]
pub struct SubmitBody {
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct DecisionBody {
    #[validate(length(max = 1000))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<RequestStatus>,
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub request: MembershipRequest,
    pub membership: Membership,
    pub payment: Payment,
}

pub async fn submit(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Path(club_id): Path<Uuid>,
    body: Option<Json<SubmitBody>>,
) -> Result<(StatusCode, Json<MembershipRequest>)> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate()?;

    let request = state
        .service_context
        .request_service
        .submit(current.account_id, club_id, body.reason)
        .await?;

    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Path(club_id): Path<Uuid>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<MembershipRequest>>> {
    let requests = state
        .service_context
        .request_service
        .list_requests(current.account_id, club_id, params.status)
        .await?;

    Ok(Json(requests))
}

pub async fn approve(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionBody>>,
) -> Result<Json<ApprovalResponse>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate()?;

    let approval = state
        .service_context
        .request_service
        .approve(current.account_id, id, body.note)
        .await?;

    Ok(Json(ApprovalResponse {
        request: approval.request,
        membership: approval.membership,
        payment: approval.payment,
    }))
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionBody>>,
) -> Result<Json<MembershipRequest>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    body.validate()?;

    let request = state
        .service_context
        .request_service
        .reject(current.account_id, id, body.note)
        .await?;

    Ok(Json(request))
}
