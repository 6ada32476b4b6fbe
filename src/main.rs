use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clubhouse::{
    api,
    config::Settings,
    repository,
    service::{CheckoutUrls, GatewayClients, ServiceContext},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clubhouse=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!("Starting Clubhouse server on {}:{}", settings.server.host, settings.server.port);

    // Initialize database
    let db_pool = repository::connect_pool(&settings.database.url, settings.database.max_connections).await?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    // Gateways stay disabled unless fully configured
    let gateways = GatewayClients::from_settings(&settings);
    match gateways.vnpay {
        Some(_) => tracing::info!("Redirect gateway (VNPay) enabled"),
        None => tracing::info!("Redirect gateway (VNPay) disabled"),
    }
    match gateways.payos {
        Some(_) => tracing::info!("Checkout gateway (payOS) enabled"),
        None => tracing::info!("Checkout gateway (payOS) disabled"),
    }

    let service_context = Arc::new(
        ServiceContext::new(db_pool, gateways, CheckoutUrls::from_settings(&settings)).await,
    );

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    let app = api::create_app(service_context, Arc::new(settings));
    axum::serve(listener, app).await?;

    Ok(())
}
