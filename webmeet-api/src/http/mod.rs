// Module: http
// WebSocket upgrades plus the JSON stats and operator API

pub mod admin;
pub mod error;
pub mod health;
pub mod stats;
pub mod websocket;

use axum::{middleware, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use webmeet_core::Config;
use webmeet_hub::HubHandle;
use webmeet_sfu::SignalingCoordinator;

use crate::observability::metrics_middleware::metrics_layer;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    /// Present when the media relay is enabled
    pub coordinator: Option<Arc<SignalingCoordinator>>,
    pub config: Arc<Config>,
}

/// Build the complete HTTP router
pub fn create_router(
    hub: HubHandle,
    coordinator: Option<Arc<SignalingCoordinator>>,
    config: Arc<Config>,
) -> Router {
    let state = AppState {
        hub,
        coordinator,
        config,
    };

    let router = Router::new()
        .merge(health::create_health_router())
        .merge(websocket::create_websocket_router())
        .merge(stats::create_stats_router())
        .merge(admin::create_admin_router());

    // Apply layers before state
    let router = router
        .layer(middleware::from_fn(metrics_layer))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Apply state to all routes (must be last)
    router.with_state(state)
}
