use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Serialize;

use crate::metrics::render_metrics;
use crate::server::AppState;

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

/// Per-tier cache health. 503 only when the cache cannot serve at all;
/// a dead remote tier shows up as `"degraded": true` with 200.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.cache.health().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(StatusResponse { status: "ok" }))
}

pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.cache.is_healthy().await {
        (StatusCode::OK, Json(StatusResponse { status: "ready" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(StatusResponse {
                status: "unavailable",
            }),
        )
    }
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    // Refresh gauges before rendering
    let _ = state.cache.stats();
    match render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "metrics recorder not installed\n".to_string(),
        ),
    }
}
