//! Media relay resources held for one application room

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use webmeet_core::{RoomId, UserId};

use crate::janus::PluginHandle;

/// Lifecycle of a user inside one room session
///
/// `NotJoined` is represented by the absence of a publisher session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantState {
    Joining,
    Published,
    Leaving,
}

/// Stable numeric id derived from a string, as the gateway wants integer ids.
///
/// `h = h * 31 + c` over the characters, never zero.
#[must_use]
pub fn stable_id(value: &str) -> u64 {
    let hash = value
        .chars()
        .fold(0u64, |h, c| h.wrapping_mul(31).wrapping_add(u64::from(c)));
    if hash == 0 {
        1
    } else {
        hash
    }
}

/// Gateway room number for an application room id
///
/// Numeric room ids are used as-is, anything else is hashed.
#[must_use]
pub fn janus_room_id(room_id: &RoomId) -> u64 {
    match room_id.as_str().parse::<u64>() {
        Ok(n) if n > 0 => n,
        _ => stable_id(room_id.as_str()),
    }
}

#[derive(Debug)]
pub struct PublisherSession {
    pub user_id: UserId,
    pub display_name: String,
    pub participant_id: u64,
    pub handle: PluginHandle,
    pub publishing: bool,
    pub state: ParticipantState,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SubscriberSession {
    pub user_id: UserId,
    pub feed_id: u64,
    pub handle: PluginHandle,
    pub created_at: DateTime<Utc>,
}

/// Subscriptions are keyed by subscriber and the feed they watch
pub type SubscriptionKey = (UserId, u64);

#[derive(Debug)]
pub struct RoomSession {
    pub room_id: RoomId,
    pub janus_room: u64,
    /// Handle used for room administration (create)
    pub room_handle: PluginHandle,
    pub publishers: HashMap<UserId, PublisherSession>,
    pub subscribers: HashMap<SubscriptionKey, SubscriberSession>,
    pub created_at: DateTime<Utc>,
}

impl RoomSession {
    #[must_use]
    pub fn new(room_id: RoomId, janus_room: u64, room_handle: PluginHandle) -> Self {
        Self {
            room_id,
            janus_room,
            room_handle,
            publishers: HashMap::new(),
            subscribers: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// A session with no participants must be torn down
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty() && self.subscribers.is_empty()
    }

    /// Every plugin handle the session owns, room handle last
    pub fn into_handles(self) -> Vec<PluginHandle> {
        self.publishers
            .into_values()
            .map(|p| p.handle)
            .chain(self.subscribers.into_values().map(|s| s.handle))
            .chain(std::iter::once(self.room_handle))
            .collect()
    }

    /// Remove the subscriptions held by `user_id`
    pub fn take_subscriptions_of(&mut self, user_id: &UserId) -> Vec<SubscriberSession> {
        let keys: Vec<SubscriptionKey> = self
            .subscribers
            .keys()
            .filter(|(subscriber, _)| subscriber == user_id)
            .cloned()
            .collect();

        keys.into_iter()
            .filter_map(|key| self.subscribers.remove(&key))
            .collect()
    }
}
