//! Rategate composition root.

#![forbid(unsafe_code)]

mod gateway_config;
mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use rategate_application::RateLimitService;
use rategate_core::{AppError, AppResult};
use rategate_infrastructure::RedisRateLimitStore;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::gateway_config::{GatewayConfig, init_tracing};
use crate::state::AppState;

#[tokio::main]
async fn main() -> AppResult<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = GatewayConfig::load()?;
    info!(
        redis_url = %config.redis_url,
        ip_limit = config.ip_rule.limit,
        ip_block_seconds = config.ip_rule.block_duration.as_secs(),
        configured_tokens = config.token_rules.len(),
        "configuration loaded"
    );

    let redis_client = build_redis_client(&config.redis_url)?;
    let store = RedisRateLimitStore::new(redis_client);
    store.ping().await?;
    info!("connected to redis");

    let rate_limit_service = RateLimitService::new(Arc::new(store));

    let app_state = AppState {
        rate_limit_service: rate_limit_service.clone(),
        ip_rule: config.ip_rule.clone(),
        token_rules: Arc::new(config.token_rules.clone()),
    };

    let app = Router::new()
        .route("/", get(handlers::root_handler))
        .route("/health", get(handlers::health_handler))
        .layer(from_fn_with_state(app_state, middleware::rate_limit))
        .layer(TraceLayer::new_for_http());

    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, "rategate listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|error| AppError::Internal(format!("gateway server error: {error}")))?;

    rate_limit_service.close().await?;
    info!("gateway stopped");
    Ok(())
}

fn build_redis_client(redis_url: &str) -> AppResult<redis::Client> {
    redis::Client::open(redis_url)
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))
}

async fn shutdown_signal() {
    let interrupt = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }

    info!("shutdown signal received");
}
