use axum::{
    extract::{Extension, State},
    Json,
};

use crate::{
    api::{middleware::auth::CurrentAccount, state::AppState},
    integrations::inbox::Notification,
};

pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentAccount>,
) -> Json<Vec<Notification>> {
    Json(state.service_context.inbox.list(current.account_id).await)
}
