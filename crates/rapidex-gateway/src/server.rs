// SPDX-FileCopyrightText: 2026 Rapidex Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use rapidex_agent::Deliverer;
use rapidex_config::model::ServerConfig;
use rapidex_core::{QueueStore, RapidexError};
use rapidex_session::ConnectionManager;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub manager: ConnectionManager,
    pub deliverer: Deliverer,
    /// Queue storage; `None` leaves `POST /queue` unmounted.
    pub queue: Option<Arc<dyn QueueStore>>,
    /// Process start time for uptime calculation.
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(manager: ConnectionManager, queue: Option<Arc<dyn QueueStore>>) -> Self {
        Self {
            deliverer: Deliverer::new(manager.clone()),
            manager,
            queue,
            start_time: Instant::now(),
        }
    }
}

/// Build the application router.
///
/// Routes:
/// - GET /, GET /health
/// - GET /qr, GET /status
/// - POST /send
/// - POST /queue (only when a queue is configured)
pub fn build_router(state: GatewayState, allowed_origins: &[String]) -> Result<Router, RapidexError> {
    let mut router = Router::new()
        .route("/", get(handlers::get_index))
        .route("/health", get(handlers::get_health))
        .route("/qr", get(handlers::get_qr))
        .route("/status", get(handlers::get_status))
        .route("/send", post(handlers::post_send));

    if state.queue.is_some() {
        router = router.route("/queue", post(handlers::post_queue));
    }

    Ok(router
        .with_state(state)
        .layer(cors_layer(allowed_origins)?)
        .layer(TraceLayer::new_for_http()))
}

/// CORS restricted to `origins`, GET/POST, `Content-Type` only.
pub fn cors_layer(origins: &[String]) -> Result<CorsLayer, RapidexError> {
    let origins = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o)
                .map_err(|e| RapidexError::Config(format!("invalid CORS origin `{o}`: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]))
}

/// Bind and serve until `shutdown` is cancelled.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), RapidexError> {
    let app = build_router(state, &config.allowed_origins)?;

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RapidexError::Internal(format!("failed to bind HTTP server to {addr}: {e}")))?;

    info!("HTTP server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| RapidexError::Internal(format!("HTTP server error: {e}")))?;

    info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_layer_rejects_invalid_origin() {
        assert!(cors_layer(&["https://rapidex.app.br".into()]).is_ok());
        assert!(cors_layer(&["bad\norigin".into()]).is_err());
    }
}
