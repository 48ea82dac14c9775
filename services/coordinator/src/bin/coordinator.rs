//! services/coordinator/src/bin/coordinator.rs

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use coordinator_lib::{
    adapters::{MockTransport, RpcBackend},
    config::Config,
    error::ApiError,
    web::{api_router, state::AppState, ApiDoc},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tutoring_core::client::ResourceClient;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Wire Up the Backend Transport ---
    // The mock transport stands in for the remote record server; its
    // notification channel feeds the cache-rebase pump below.
    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut transport = MockTransport::new().with_notifications(notify_tx);
    if config.demo_data {
        transport = transport.with_demo_data();
    }
    let backend = Arc::new(RpcBackend::new(transport, config.rpc_timeout));

    // --- 3. Build the Resource Client & Load All Resources ---
    let client = Arc::new(ResourceClient::new(backend));
    info!("Retrieving all resources from the backend...");
    client.refresh_all().await?;
    info!("All resources loaded.");

    // --- 4. Spawn the Notification Pump ---
    let pump_client = client.clone();
    tokio::spawn(async move {
        while let Some(notification) = notify_rx.recv().await {
            pump_client.apply_notification(notification);
        }
        warn!("notification channel closed");
    });

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        client,
        config: config.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors_origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("Invalid CORS origin: {e}")))?,
        )
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    let app = Router::new()
        .merge(api_router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
