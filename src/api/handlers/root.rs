use axum::{http::StatusCode, Json, response::IntoResponse};
use serde_json::json;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Clubhouse API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Membership requests and fee reconciliation for student clubs",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "api": "/api",
            "gateway_callbacks": "/payments"
        }
    }))
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
