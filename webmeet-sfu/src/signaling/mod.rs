//! Signaling coordinator
//!
//! Owns the mapping from application rooms and users to gateway resources.

mod coordinator;
mod session;

pub use coordinator::{
    PublisherInfo, RoomStats, SignalingCoordinator, SignalingStats, SubscriberInfo, UserStats,
};
pub use session::{janus_room_id, stable_id, ParticipantState};
