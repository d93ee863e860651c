//! Health check endpoints
//!
//! Provides simple health check for monitoring.

use axum::{http::header, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

use crate::http::{AppError, AppResult, AppState};

/// Health check router
pub fn create_health_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
}

/// Basic health check (always returns OK if server is running)
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "websocket-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Prometheus text exposition
pub async fn metrics() -> AppResult<impl IntoResponse> {
    let body = webmeet_core::metrics::gather_metrics().map_err(|e| {
        tracing::error!("Failed to encode metrics: {}", e);
        AppError::internal("Failed to encode metrics")
    })?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    ))
}
