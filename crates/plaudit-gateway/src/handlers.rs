// SPDX-FileCopyrightText: 2026 Plaudit Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use chrono::Utc;
use plaudit_core::{HealthStatus, PluginAdapter};
use plaudit_storage::ClickOutcome;
use plaudit_storage::queries::clicks;
use plaudit_webhook::{PayloadFormat, parse_events};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::pages;
use crate::server::GatewayState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Acknowledgement for a webhook batch. `accepted` counts parsed events.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub accepted: usize,
}

/// GET /health
///
/// 200 when the store answers, 503 otherwise.
pub async fn get_health(State(state): State<GatewayState>) -> Response {
    let (code, status) = match state.db.health_check().await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "ok"),
        Ok(HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason)) => {
            warn!(reason = reason.as_str(), "health check: store unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
        Err(e) => {
            warn!(error = %e, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };
    let body = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    };
    (code, Json(body)).into_response()
}

/// GET /metrics
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics export disabled").into_response(),
    }
}

/// POST /webhooks/{provider}
///
/// Parses the batch and hands it to the reconciler on a tracked background task.
/// Known providers always get 200, even for bodies that cannot be parsed.
pub async fn post_webhook(
    State(state): State<GatewayState>,
    Path(provider): Path<String>,
    body: Bytes,
) -> Response {
    let Some(format) = PayloadFormat::from_provider(&provider) else {
        warn!(provider = provider.as_str(), "webhook for unknown provider");
        return (StatusCode::NOT_FOUND, "unknown provider").into_response();
    };

    let events = match parse_events(format, &body) {
        Ok(events) => events,
        Err(e) => {
            warn!(
                provider = provider.as_str(),
                bytes = body.len(),
                error = %e,
                "discarding unparseable webhook body"
            );
            Vec::new()
        }
    };

    let accepted = events.len();
    if accepted > 0 {
        let reconciler = state.reconciler.clone();
        state.ingest_tasks.spawn(async move {
            reconciler.ingest(&provider, events).await;
        });
    }
    (StatusCode::OK, Json(WebhookAck { accepted })).into_response()
}

/// GET /r/{token}
///
/// Records the click and answers with a transitional page to the review target.
pub async fn get_redirect(
    State(state): State<GatewayState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Response {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let metadata = json!({ "user_agent": user_agent });

    let outcome = match clicks::record_click(&state.db, &token, Utc::now(), metadata).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "failed to resolve tracking token");
            #[cfg(feature = "prometheus")]
            plaudit_prometheus::record_click("error");
            return (StatusCode::INTERNAL_SERVER_ERROR, Html(pages::error_page())).into_response();
        }
    };

    match outcome {
        ClickOutcome::NotFound => {
            info!("tracking token not found");
            #[cfg(feature = "prometheus")]
            plaudit_prometheus::record_click("not_found");
            (StatusCode::NOT_FOUND, Html(pages::not_found_page())).into_response()
        }
        ClickOutcome::Inactive { dispatch_id, status } => {
            info!(dispatch_id = dispatch_id.as_str(), %status, "tracking link inactive");
            #[cfg(feature = "prometheus")]
            plaudit_prometheus::record_click("inactive");
            (StatusCode::GONE, Html(pages::inactive_page())).into_response()
        }
        ClickOutcome::FirstClick(context) | ClickOutcome::RepeatClick(context) => {
            let target = pages::resolve_target(&context, &state.redirect.fallback_url);
            let page = pages::redirect_page(&context, target);
            info!(
                dispatch_id = context.dispatch_id.as_str(),
                status = %context.status,
                target,
                "tracking redirect resolved"
            );
            #[cfg(feature = "prometheus")]
            plaudit_prometheus::record_click("redirected");
            (StatusCode::OK, Html(page)).into_response()
        }
    }
}
