//! Shared building blocks for the WebMeet signaling service.
//!
//! Identifiers, configuration, logging bootstrap, metrics and the
//! `SignalingHandler` capability that connects the connection hub to the
//! media relay coordinator.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod signaling;

pub use config::Config;
pub use error::{Error, Result};
pub use models::{ConnectionId, RoomId, UserId};
pub use signaling::{IceCandidate, SignalingHandler};
