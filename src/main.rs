use std::sync::Arc;

use axum::{http::HeaderValue, middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use yapp_hub::adapters::auth::JwtSessionValidator;
use yapp_hub::adapters::http::middleware::{auth_middleware, AuthState};
use yapp_hub::adapters::memory::{InMemoryMessagePersister, InMemoryRoomDirectory};
use yapp_hub::adapters::websocket::{websocket_router, Hub, WebSocketState};
use yapp_hub::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    let validator: AuthState = Arc::new(JwtSessionValidator::new(config.auth.jwt_secret.clone()));

    // Relational adapters are wired in by the embedding service.
    tracing::warn!("Using in-memory room directory and message store");
    let directory = Arc::new(InMemoryRoomDirectory::new());
    let persister = Arc::new(InMemoryMessagePersister::new());

    let hub = Hub::new(config.hub.clone(), persister);
    hub.run()?;

    let app: Router = websocket_router()
        .with_state(WebSocketState::new(hub.clone(), directory))
        .layer(middleware::from_fn_with_state(validator, auth_middleware))
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    hub.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
