// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Routes:
//! - `GET /health` (public)
//! - `GET /ws` (tenant binding and token check happen in the `init` message)

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use wapulse_agent::Runtime;
use wapulse_bus::EventBridge;
use wapulse_config::model::GatewayConfig;
use wapulse_core::{ConnectionState, WapulseError};

use crate::ws;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub runtime: Arc<Runtime>,
    /// Where sockets subscribe for their tenant's notifications.
    pub bridge: Arc<EventBridge>,
    /// Expected `init` token. `None` disables the check.
    pub bearer_token: Option<String>,
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(runtime: Arc<Runtime>, bridge: Arc<EventBridge>, config: &GatewayConfig) -> Self {
        Self {
            runtime,
            bridge,
            bearer_token: config.bearer_token.clone(),
            start_time: Instant::now(),
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub system_session: ConnectionState,
    pub tenant_sessions: usize,
}

async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
        system_session: state.runtime.system_state(),
        tenant_sessions: state.runtime.supervisor().tenants().len(),
    })
}

/// Builds the gateway router with tracing and permissive CORS layers.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/ws", get(ws::ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Binds the configured address and serves until `shutdown` is cancelled.
pub async fn serve(
    config: &GatewayConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), WapulseError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| WapulseError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;
    serve_on(listener, state, shutdown).await
}

/// Serves on an already bound listener.
pub async fn serve_on(
    listener: TcpListener,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), WapulseError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "gateway listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| WapulseError::Internal(format!("gateway server error: {e}")))
}
