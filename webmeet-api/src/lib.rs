// WebMeet API Library
//
// HTTP surface of the signaling service: WebSocket upgrades, stats, operator
// endpoints, health and metrics

pub mod http;
pub mod observability;

// Re-export commonly used types
pub use http::{create_router, AppState};
