// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use plaudit_config::model::{GatewayConfig, RedirectConfig};
use plaudit_core::PlauditError;
use plaudit_storage::Database;
use plaudit_webhook::WebhookReconciler;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Health state for the unauthenticated health and metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Prometheus text renderer, when metrics export is enabled.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl HealthState {
    pub fn new(prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>) -> Self {
        Self {
            start_time: std::time::Instant::now(),
            prometheus_render,
        }
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub db: Database,
    pub reconciler: WebhookReconciler,
    pub redirect: RedirectConfig,
    pub health: HealthState,
    /// Accepted webhook batches still being reconciled.
    pub ingest_tasks: TaskTracker,
}

/// All gateway routes. None of them require authentication.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .route("/webhooks/{provider}", post(handlers::post_webhook))
        .route("/r/{token}", get(handlers::get_redirect))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind `host:port` and serve until `cancel` fires.
///
/// Returns only after every acknowledged webhook batch has been reconciled
/// or parked, so the caller may close the store afterwards.
pub async fn start_server(
    config: &GatewayConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), PlauditError> {
    let ingest_tasks = state.ingest_tasks.clone();
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PlauditError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!(public_base_url = config.public_base_url.as_str(), "gateway listening on {addr}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| PlauditError::Internal(format!("gateway server error: {e}")));

    ingest_tasks.close();
    if !ingest_tasks.is_empty() {
        tracing::info!(pending = ingest_tasks.len(), "waiting for webhook batches to finish");
    }
    ingest_tasks.wait().await;

    served?;
    tracing::info!("gateway stopped");
    Ok(())
}
