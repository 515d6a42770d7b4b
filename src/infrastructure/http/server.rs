//! Router assembly and the listener loop.

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::domain::models::ServerConfig;

use super::correlation::{request_span, CorrelationId, CORRELATION_ID_HEADER};
use super::handlers;
use super::state::AppState;

/// Build the router. `request_timeout` bounds the non-streaming routes.
pub fn build_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    let bounded = Router::new()
        .route("/api/v1/chat/message", post(handlers::send_message))
        .route("/api/v1/chat/start", post(handlers::start_conversation))
        .route("/api/v1/chat/usage", get(handlers::usage))
        .route("/api/v1/chat/conversations", get(handlers::list_conversations))
        .route(
            "/api/v1/chat/conversations/{conversation_id}",
            get(handlers::get_conversation).delete(handlers::archive_conversation),
        )
        .route("/health/ready", get(handlers::readiness))
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/health/live", get(handlers::liveness))
        .route("/api/v1/chat/stream", get(handlers::stream_message))
        .merge(bounded)
        .with_state(state)
        .layer(PropagateRequestIdLayer::new(CORRELATION_ID_HEADER))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(SetRequestIdLayer::new(CORRELATION_ID_HEADER, CorrelationId))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(state: Arc<AppState>, config: &ServerConfig, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;
    let router = build_router(state, Duration::from_secs(config.request_timeout_secs));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Dave gateway listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .context("HTTP server failed")?;
    Ok(())
}
