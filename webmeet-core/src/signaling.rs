//! Capability the connection hub uses to reach the media relay coordinator.
//!
//! The hub only knows this trait; whether a coordinator exists at all is decided
//! when the hub is constructed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{RoomId, UserId};
use crate::Result;

/// ICE candidate as carried by the signaling protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Full candidate string
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u32>,
}

/// Signaling events that require media relay resources
#[async_trait]
pub trait SignalingHandler: Send + Sync {
    /// Allocate a publisher slot for `user_id` in `room_id`
    async fn join_room(&self, room_id: &RoomId, user_id: &UserId, display_name: &str)
        -> Result<()>;

    /// Release every relay resource `user_id` holds in `room_id`
    async fn leave_room(&self, room_id: &RoomId, user_id: &UserId) -> Result<()>;

    /// Publish the sender's media described by `sdp`
    async fn handle_offer(&self, room_id: &RoomId, from_user_id: &UserId, sdp: &str)
        -> Result<()>;

    /// Subscribe `from_user_id` to the feed published by `to_user_id`
    async fn handle_answer(
        &self,
        room_id: &RoomId,
        from_user_id: &UserId,
        to_user_id: &UserId,
        sdp: &str,
    ) -> Result<()>;

    async fn handle_ice_candidate(
        &self,
        room_id: &RoomId,
        from_user_id: &UserId,
        to_user_id: &UserId,
        candidate: &IceCandidate,
    ) -> Result<()>;
}
