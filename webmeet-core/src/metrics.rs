//! Prometheus metrics for the signaling service
//!
//! Everything registers into one registry, exposed by the `/metrics` endpoint.

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry, Encoder, HistogramVec, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Connection hub
pub mod hub {
    use super::{
        register_int_counter_vec_with_registry, register_int_gauge_with_registry, IntCounterVec,
        IntGauge, REGISTRY,
    };

    /// Connected peers gauge
    pub static CONNECTED_PEERS: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "hub_connected_peers",
            "Current number of registered peer connections",
            REGISTRY.clone()
        )
        .expect("Failed to register CONNECTED_PEERS")
    });

    /// Rooms with at least one member
    pub static ACTIVE_ROOMS: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "hub_active_rooms",
            "Current number of rooms with at least one member",
            REGISTRY.clone()
        )
        .expect("Failed to register ACTIVE_ROOMS")
    });

    /// Peers removed because their outbound queue was full or closed
    pub static PEER_EVICTIONS: std::sync::LazyLock<IntCounterVec> =
        std::sync::LazyLock::new(|| {
            register_int_counter_vec_with_registry!(
                "hub_peer_evictions_total",
                "Total number of peers evicted as slow or dead consumers",
                &["reason"],
                REGISTRY.clone()
            )
            .expect("Failed to register PEER_EVICTIONS")
        });

    /// Messages that could not be routed
    pub static DROPPED_MESSAGES: std::sync::LazyLock<IntCounterVec> =
        std::sync::LazyLock::new(|| {
            register_int_counter_vec_with_registry!(
                "hub_dropped_messages_total",
                "Total number of messages dropped by the hub",
                &["reason"],
                REGISTRY.clone()
            )
            .expect("Failed to register DROPPED_MESSAGES")
        });
}

/// Signaling coordinator
pub mod signaling {
    use super::{
        register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
        register_int_gauge_with_registry, HistogramVec, IntCounterVec, IntGauge, REGISTRY,
    };

    /// Coordinator operations by outcome
    pub static OPERATIONS: std::sync::LazyLock<IntCounterVec> = std::sync::LazyLock::new(|| {
        register_int_counter_vec_with_registry!(
            "signaling_operations_total",
            "Total number of signaling coordinator operations",
            &["operation", "outcome"],
            REGISTRY.clone()
        )
        .expect("Failed to register OPERATIONS")
    });

    /// Live room sessions on the media server
    pub static ROOM_SESSIONS: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "signaling_room_sessions",
            "Current number of media server room sessions",
            REGISTRY.clone()
        )
        .expect("Failed to register ROOM_SESSIONS")
    });

    /// Media server request latency
    pub static SFU_REQUEST_DURATION: std::sync::LazyLock<HistogramVec> =
        std::sync::LazyLock::new(|| {
            register_histogram_vec_with_registry!(
                "sfu_request_duration_seconds",
                "Media server control request duration in seconds",
                &["action", "outcome"],
                REGISTRY.clone()
            )
            .expect("Failed to register SFU_REQUEST_DURATION")
        });
}

/// Render every registered metric in the Prometheus text format
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|_| prometheus::Error::Msg("Invalid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        hub::PEER_EVICTIONS.with_label_values(&["queue_full"]).inc();
        signaling::OPERATIONS.with_label_values(&["join", "ok"]).inc();
        signaling::SFU_REQUEST_DURATION
            .with_label_values(&["attach", "ok"])
            .observe(0.01);

        let output = gather_metrics().unwrap();
        assert!(output.contains("hub_peer_evictions_total"));
        assert!(output.contains("signaling_operations_total"));
        assert!(output.contains("sfu_request_duration_seconds"));
    }
}
