//! Media relay integration for WebMeet
//!
//! Rooms are relayed by a Janus gateway running the VideoRoom plugin. This
//! crate holds two layers:
//!
//! - **`janus`**: a thin JSON-over-HTTP client for the gateway's control API
//! - **`signaling`**: the coordinator that maps application rooms and users
//!   onto Janus sessions, plugin handles and publisher/subscriber bindings
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use webmeet_sfu::{JanusClient, SignalingCoordinator};
//!
//! let client = Arc::new(JanusClient::new(&config.janus)?);
//! let coordinator = Arc::new(SignalingCoordinator::new(client));
//! coordinator.join_room(&room_id, &user_id, "Alice").await?;
//! ```

mod error;
pub mod janus;
pub mod signaling;

pub use error::{Result, SfuError};
pub use janus::{JanusClient, PluginHandle};
pub use signaling::{
    ParticipantState, PublisherInfo, RoomStats, SignalingCoordinator, SignalingStats,
    SubscriberInfo, UserStats,
};
