pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};
use std::sync::Arc;

use crate::{
    config::Settings,
    service::ServiceContext,
};
use state::AppState;

pub fn create_app(service_context: Arc<ServiceContext>, settings: Arc<Settings>) -> Router {
    let app_state = AppState::new(service_context, settings);

    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))

        // Member and leader API, bearer token required
        .nest("/api", api_routes(app_state.clone()))

        // Gateway callbacks, authenticated by their signatures
        .nest("/payments", callback_routes())

        .with_state(app_state)

        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive()) // Configure properly for production
        .layer(TraceLayer::new_for_http())
}

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/clubs/:club_id/requests",
            post(handlers::requests::submit).get(handlers::requests::list),
        )
        .route("/requests/:id/approve", post(handlers::requests::approve))
        .route("/requests/:id/reject", post(handlers::requests::reject))
        .route("/memberships/:id", get(handlers::memberships::get))
        .route(
            "/memberships/:id/payments",
            post(handlers::memberships::open_payment).get(handlers::memberships::list_payments),
        )
        .route("/memberships/:id/lock", post(handlers::memberships::lock))
        .route("/memberships/:id/unlock", post(handlers::memberships::unlock))
        .route("/memberships/:id/remove", post(handlers::memberships::remove))
        .route("/payments/:id/link", post(handlers::payments::create_link))
        .route("/payments/:id/confirm", post(handlers::payments::confirm))
        .route("/notifications", get(handlers::notifications::list))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_auth,
        ))
}

fn callback_routes() -> Router<AppState> {
    Router::new()
        .route("/vnpay/return", get(handlers::callbacks::vnpay_return))
        .route(
            "/vnpay/ipn",
            get(handlers::callbacks::vnpay_ipn).post(handlers::callbacks::vnpay_ipn_form),
        )
        .route("/payos/webhook", post(handlers::callbacks::payos_webhook))
        .route("/payos/return", get(handlers::callbacks::payos_return))
}
