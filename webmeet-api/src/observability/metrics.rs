//! HTTP request metrics
//!
//! Registered into the shared registry from `webmeet_core::metrics`, so one
//! `/metrics` scrape covers the hub, the coordinator and the HTTP layer.

use std::sync::LazyLock;

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry, HistogramVec, IntCounterVec, IntGauge,
};
use webmeet_core::metrics::REGISTRY;

/// Total HTTP requests, labeled by method, path, and status code.
pub static HTTP_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"],
        REGISTRY.clone()
    )
    .expect("failed to register http_requests_total")
});

/// HTTP request duration in seconds, labeled by method and path.
pub static HTTP_REQUEST_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec_with_registry!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        REGISTRY.clone()
    )
    .expect("failed to register http_request_duration_seconds")
});

/// Number of in-flight HTTP requests.
pub static HTTP_REQUESTS_IN_FLIGHT: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "http_requests_in_flight",
        "Number of HTTP requests currently being processed",
        REGISTRY.clone()
    )
    .expect("failed to register http_requests_in_flight")
});

/// Normalize a request path for metric labels.
///
/// Room and user identifiers are replaced with `:id` so labels stay low
/// cardinality.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let mut result = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            result.push(*segment);
            continue;
        }

        let prev = if i > 0 { segments.get(i - 1) } else { None };
        let is_id = matches!(prev, Some(&"rooms" | &"users"));

        if is_id {
            result.push(":id");
        } else {
            result.push(segment);
        }
    }

    result.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_replaces_ids() {
        assert_eq!(
            normalize_path("/api/v1/websocket/rooms/abc123/users"),
            "/api/v1/websocket/rooms/:id/users"
        );
        assert_eq!(
            normalize_path("/api/v1/websocket/admin/users/alice/disconnect"),
            "/api/v1/websocket/admin/users/:id/disconnect"
        );
        assert_eq!(normalize_path("/api/v1/signaling/users/bob"), "/api/v1/signaling/users/:id");
    }

    #[test]
    fn test_normalize_path_keeps_static_paths() {
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/api/v1/websocket/stats"), "/api/v1/websocket/stats");
        assert_eq!(normalize_path("/"), "/");
    }
}
