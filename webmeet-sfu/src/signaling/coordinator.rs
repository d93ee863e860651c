use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use webmeet_core::metrics::signaling::{OPERATIONS, ROOM_SESSIONS};
use webmeet_core::{IceCandidate, RoomId, SignalingHandler, UserId};

use super::session::{
    janus_room_id, stable_id, ParticipantState, PublisherSession, RoomSession, SubscriberSession,
};
use crate::error::{Result, SfuError};
use crate::janus::{JanusClient, PluginHandle};

/// One room's session, `None` until the room is opened on the gateway
type RoomSlot = Arc<Mutex<Option<RoomSession>>>;
type RoomGuard = OwnedMutexGuard<Option<RoomSession>>;

#[derive(Debug, Clone, Serialize)]
pub struct PublisherInfo {
    pub user_id: UserId,
    pub display_name: String,
    pub participant_id: u64,
    pub publishing: bool,
    pub state: ParticipantState,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriberInfo {
    pub user_id: UserId,
    pub feed_id: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomStats {
    pub room_id: RoomId,
    pub exists: bool,
    pub janus_room: Option<u64>,
    pub publisher_count: usize,
    pub subscriber_count: usize,
    pub publishers: Vec<PublisherInfo>,
    pub subscribers: Vec<SubscriberInfo>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub user_id: UserId,
    pub rooms: Vec<RoomId>,
    pub publisher_count: usize,
    pub subscriber_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalingStats {
    pub room_count: usize,
    pub publisher_count: usize,
    pub subscriber_count: usize,
    pub rooms: Vec<RoomStats>,
}

/// Maps application rooms and users onto gateway resources
///
/// Each room has its own async lock, so a slow gateway round-trip for one room
/// never blocks another. Plugin handles are released exactly once: a handle is
/// owned by the session that attached it and consumed when detached.
pub struct SignalingCoordinator {
    client: Arc<JanusClient>,
    rooms: DashMap<RoomId, RoomSlot>,
}

impl SignalingCoordinator {
    #[must_use]
    pub fn new(client: Arc<JanusClient>) -> Self {
        Self {
            client,
            rooms: DashMap::new(),
        }
    }

    #[must_use]
    pub fn client(&self) -> &Arc<JanusClient> {
        &self.client
    }

    /// Number of rooms with a live (or opening) session
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Join `user_id` to `room_id` as a publisher
    ///
    /// Opens the room on the gateway if needed. On failure nothing is left
    /// registered: handles attached during the attempt are detached and a room
    /// opened by the attempt is closed again. Joining twice is a no-op.
    pub async fn join_room(&self, room_id: &RoomId, user_id: &UserId, display_name: &str) -> Result<()> {
        let (slot, mut guard) = self.lock_or_create(room_id).await;

        if guard
            .as_ref()
            .is_some_and(|session| session.publishers.contains_key(user_id))
        {
            debug!(room_id = %room_id, user_id = %user_id, "User already joined media room");
            return Ok(());
        }

        let mut session = match guard.take() {
            Some(session) => session,
            None => match self.open_room(room_id).await {
                Ok(session) => session,
                Err(e) => {
                    self.discard_slot(room_id, &slot);
                    return Err(e);
                }
            },
        };

        match self
            .attach_publisher(session.janus_room, user_id, display_name)
            .await
        {
            Ok(publisher) => {
                info!(
                    room_id = %room_id,
                    user_id = %user_id,
                    janus_room = session.janus_room,
                    participant_id = publisher.participant_id,
                    "User joined media room"
                );
                session.publishers.insert(user_id.clone(), publisher);
                *guard = Some(session);
                Ok(())
            }
            Err(e) => {
                warn!(room_id = %room_id, user_id = %user_id, error = %e, "Failed to join media room");
                if session.is_empty() {
                    self.close_room(session).await;
                    self.discard_slot(room_id, &slot);
                } else {
                    *guard = Some(session);
                }
                Err(e)
            }
        }
    }

    /// Release every handle `user_id` holds in `room_id`
    ///
    /// Closes the room once nobody is left. Leaving a room without a session
    /// is a no-op.
    pub async fn leave_room(&self, room_id: &RoomId, user_id: &UserId) -> Result<()> {
        let Some((slot, mut guard)) = self.lock_existing(room_id).await else {
            debug!(room_id = %room_id, user_id = %user_id, "No media session to leave");
            return Ok(());
        };
        let Some(session) = guard.as_mut() else {
            return Ok(());
        };

        let publisher = session.publishers.remove(user_id);
        let subscriptions = session.take_subscriptions_of(user_id);
        if publisher.is_none() && subscriptions.is_empty() {
            debug!(room_id = %room_id, user_id = %user_id, "User holds no media resources in room");
            return Ok(());
        }

        if let Some(mut publisher) = publisher {
            publisher.state = ParticipantState::Leaving;
            debug!(
                room_id = %room_id,
                user_id = %user_id,
                state = ?publisher.state,
                "Releasing publisher handle"
            );
            self.release(publisher.handle).await;
        }
        for subscription in subscriptions {
            self.release(subscription.handle).await;
        }

        let now_empty = session.is_empty();
        info!(room_id = %room_id, user_id = %user_id, "User left media room");

        if now_empty {
            if let Some(session) = guard.take() {
                self.close_room(session).await;
            }
            self.discard_slot(room_id, &slot);
        }

        Ok(())
    }

    /// Publish the sender's media on its existing publisher handle
    pub async fn handle_offer(&self, room_id: &RoomId, from_user_id: &UserId, sdp: &str) -> Result<()> {
        let no_publisher = || SfuError::NoPublisher {
            room_id: room_id.clone(),
            user_id: from_user_id.clone(),
        };

        let (_slot, mut guard) = self.lock_existing(room_id).await.ok_or_else(no_publisher)?;
        let publisher = guard
            .as_mut()
            .and_then(|session| session.publishers.get_mut(from_user_id))
            .ok_or_else(no_publisher)?;

        self.client.publish(&publisher.handle, sdp).await?;
        publisher.publishing = true;

        info!(room_id = %room_id, user_id = %from_user_id, "Offer published");
        Ok(())
    }

    /// Subscribe `from_user_id` to the feed of `to_user_id`, answering with `sdp`
    ///
    /// An existing subscription to the same feed is reused.
    pub async fn handle_answer(
        &self,
        room_id: &RoomId,
        from_user_id: &UserId,
        to_user_id: &UserId,
        sdp: &str,
    ) -> Result<()> {
        let no_publisher = || SfuError::NoPublisher {
            room_id: room_id.clone(),
            user_id: to_user_id.clone(),
        };

        let (_slot, mut guard) = self.lock_existing(room_id).await.ok_or_else(no_publisher)?;
        let session = guard.as_mut().ok_or_else(no_publisher)?;
        let feed_id = session
            .publishers
            .get(to_user_id)
            .map(|publisher| publisher.participant_id)
            .ok_or_else(no_publisher)?;
        let key = (from_user_id.clone(), feed_id);

        if let Some(existing) = session.subscribers.get(&key) {
            self.client
                .subscribe(&existing.handle, session.janus_room, feed_id, sdp)
                .await?;
            debug!(room_id = %room_id, user_id = %from_user_id, feed_id = feed_id, "Subscription renewed");
            return Ok(());
        }

        let handle = self.client.attach().await?;
        if let Err(e) = self
            .client
            .subscribe(&handle, session.janus_room, feed_id, sdp)
            .await
        {
            self.release(handle).await;
            return Err(e);
        }

        session.subscribers.insert(
            key,
            SubscriberSession {
                user_id: from_user_id.clone(),
                feed_id,
                handle,
                created_at: Utc::now(),
            },
        );

        info!(
            room_id = %room_id,
            user_id = %from_user_id,
            publisher = %to_user_id,
            feed_id = feed_id,
            "Subscribed to feed"
        );
        Ok(())
    }

    /// Tear down every room session at least `max_age` old
    pub async fn cleanup(&self, max_age: Duration) -> usize {
        self.cleanup_at(max_age, Utc::now()).await
    }

    /// [`cleanup`](Self::cleanup) against an explicit clock
    ///
    /// Age is measured from creation, not from last activity.
    pub async fn cleanup_at(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        let room_ids: Vec<RoomId> = self.rooms.iter().map(|entry| entry.key().clone()).collect();
        let mut removed = 0;

        for room_id in room_ids {
            let Some((slot, mut guard)) = self.lock_existing(&room_id).await else {
                continue;
            };
            let expired = guard
                .as_ref()
                .is_some_and(|session| now - session.created_at >= max_age);
            if !expired {
                continue;
            }

            if let Some(session) = guard.take() {
                info!(
                    room_id = %room_id,
                    publishers = session.publishers.len(),
                    subscribers = session.subscribers.len(),
                    "Cleaning up expired media room"
                );
                self.close_room(session).await;
            }
            self.discard_slot(&room_id, &slot);
            removed += 1;
        }

        removed
    }

    pub async fn room_stats(&self, room_id: &RoomId) -> RoomStats {
        match self.lock_existing(room_id).await {
            Some((_slot, guard)) => stats_of(room_id, guard.as_ref()),
            None => stats_of(room_id, None),
        }
    }

    pub async fn user_stats(&self, user_id: &UserId) -> UserStats {
        let mut stats = UserStats {
            user_id: user_id.clone(),
            rooms: Vec::new(),
            publisher_count: 0,
            subscriber_count: 0,
        };

        for room_id in self.room_ids() {
            let Some((_slot, guard)) = self.lock_existing(&room_id).await else {
                continue;
            };
            let Some(session) = guard.as_ref() else {
                continue;
            };

            let publishing = usize::from(session.publishers.contains_key(user_id));
            let subscriptions = session
                .subscribers
                .keys()
                .filter(|(subscriber, _)| subscriber == user_id)
                .count();
            if publishing + subscriptions > 0 {
                stats.rooms.push(room_id);
                stats.publisher_count += publishing;
                stats.subscriber_count += subscriptions;
            }
        }

        stats
    }

    pub async fn all_stats(&self) -> SignalingStats {
        let mut rooms = Vec::new();
        for room_id in self.room_ids() {
            if let Some((_slot, guard)) = self.lock_existing(&room_id).await {
                if guard.is_some() {
                    rooms.push(stats_of(&room_id, guard.as_ref()));
                }
            }
        }

        SignalingStats {
            room_count: rooms.len(),
            publisher_count: rooms.iter().map(|r| r.publisher_count).sum(),
            subscriber_count: rooms.iter().map(|r| r.subscriber_count).sum(),
            rooms,
        }
    }

    fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Lock the room's slot, inserting an empty one if absent
    async fn lock_or_create(&self, room_id: &RoomId) -> (RoomSlot, RoomGuard) {
        loop {
            let slot = self.rooms.entry(room_id.clone()).or_default().value().clone();
            if let Some(guard) = self.lock_if_current(room_id, &slot).await {
                return (slot, guard);
            }
        }
    }

    async fn lock_existing(&self, room_id: &RoomId) -> Option<(RoomSlot, RoomGuard)> {
        loop {
            let slot = self.rooms.get(room_id)?.value().clone();
            if let Some(guard) = self.lock_if_current(room_id, &slot).await {
                return Some((slot, guard));
            }
        }
    }

    /// The slot may have been discarded while we waited for its lock
    async fn lock_if_current(&self, room_id: &RoomId, slot: &RoomSlot) -> Option<RoomGuard> {
        let guard = Arc::clone(slot).lock_owned().await;
        let current = self
            .rooms
            .get(room_id)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), slot));
        current.then_some(guard)
    }

    fn discard_slot(&self, room_id: &RoomId, slot: &RoomSlot) {
        self.rooms.remove_if(room_id, |_, current| Arc::ptr_eq(current, slot));
    }

    async fn open_room(&self, room_id: &RoomId) -> Result<RoomSession> {
        let janus_room = janus_room_id(room_id);
        let handle = self.client.attach().await?;

        let description = format!("WebMeet room {room_id}");
        if let Err(e) = self.client.create_room(&handle, janus_room, &description).await {
            self.release(handle).await;
            return Err(e);
        }

        ROOM_SESSIONS.inc();
        info!(room_id = %room_id, janus_room = janus_room, "Media room opened");
        Ok(RoomSession::new(room_id.clone(), janus_room, handle))
    }

    async fn close_room(&self, session: RoomSession) {
        let room_id = session.room_id.clone();
        for handle in session.into_handles() {
            self.release(handle).await;
        }

        ROOM_SESSIONS.dec();
        info!(room_id = %room_id, "Media room closed");
    }

    async fn attach_publisher(
        &self,
        janus_room: u64,
        user_id: &UserId,
        display_name: &str,
    ) -> Result<PublisherSession> {
        let handle = self.client.attach().await?;
        let mut publisher = PublisherSession {
            user_id: user_id.clone(),
            display_name: display_name.to_string(),
            participant_id: stable_id(user_id.as_str()),
            handle,
            publishing: false,
            state: ParticipantState::Joining,
            joined_at: Utc::now(),
        };

        if let Err(e) = self
            .client
            .join_as_publisher(&publisher.handle, janus_room, publisher.participant_id, display_name)
            .await
        {
            self.release(publisher.handle).await;
            return Err(e);
        }

        publisher.state = ParticipantState::Published;
        Ok(publisher)
    }

    /// Detach a handle; failures are logged, the handle is gone either way
    async fn release(&self, handle: PluginHandle) {
        let handle_id = handle.handle_id();
        if let Err(e) = self.client.detach(handle).await {
            warn!(handle_id = handle_id, error = %e, "Failed to detach plugin handle");
        }
    }
}

fn stats_of(room_id: &RoomId, session: Option<&RoomSession>) -> RoomStats {
    let Some(session) = session else {
        return RoomStats {
            room_id: room_id.clone(),
            exists: false,
            janus_room: None,
            publisher_count: 0,
            subscriber_count: 0,
            publishers: Vec::new(),
            subscribers: Vec::new(),
            created_at: None,
        };
    };

    let mut publishers: Vec<PublisherInfo> = session
        .publishers
        .values()
        .map(|p| PublisherInfo {
            user_id: p.user_id.clone(),
            display_name: p.display_name.clone(),
            participant_id: p.participant_id,
            publishing: p.publishing,
            state: p.state,
            joined_at: p.joined_at,
        })
        .collect();
    publishers.sort_by(|a, b| a.user_id.cmp(&b.user_id));

    let mut subscribers: Vec<SubscriberInfo> = session
        .subscribers
        .values()
        .map(|s| SubscriberInfo {
            user_id: s.user_id.clone(),
            feed_id: s.feed_id,
            created_at: s.created_at,
        })
        .collect();
    subscribers.sort_by(|a, b| a.user_id.cmp(&b.user_id).then(a.feed_id.cmp(&b.feed_id)));

    RoomStats {
        room_id: room_id.clone(),
        exists: true,
        janus_room: Some(session.janus_room),
        publisher_count: publishers.len(),
        subscriber_count: subscribers.len(),
        publishers,
        subscribers,
        created_at: Some(session.created_at),
    }
}

fn record(operation: &'static str, result: Result<()>) -> webmeet_core::Result<()> {
    let outcome = if result.is_ok() { "ok" } else { "error" };
    OPERATIONS.with_label_values(&[operation, outcome]).inc();
    result.map_err(Into::into)
}

#[async_trait]
impl SignalingHandler for SignalingCoordinator {
    async fn join_room(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        display_name: &str,
    ) -> webmeet_core::Result<()> {
        record("join", Self::join_room(self, room_id, user_id, display_name).await)
    }

    async fn leave_room(&self, room_id: &RoomId, user_id: &UserId) -> webmeet_core::Result<()> {
        record("leave", Self::leave_room(self, room_id, user_id).await)
    }

    async fn handle_offer(
        &self,
        room_id: &RoomId,
        from_user_id: &UserId,
        sdp: &str,
    ) -> webmeet_core::Result<()> {
        record("offer", Self::handle_offer(self, room_id, from_user_id, sdp).await)
    }

    async fn handle_answer(
        &self,
        room_id: &RoomId,
        from_user_id: &UserId,
        to_user_id: &UserId,
        sdp: &str,
    ) -> webmeet_core::Result<()> {
        record(
            "answer",
            Self::handle_answer(self, room_id, from_user_id, to_user_id, sdp).await,
        )
    }

    async fn handle_ice_candidate(
        &self,
        room_id: &RoomId,
        from_user_id: &UserId,
        to_user_id: &UserId,
        candidate: &IceCandidate,
    ) -> webmeet_core::Result<()> {
        // Candidates reach the remote peer through the hub; trickle to the
        // gateway is not wired up.
        debug!(
            room_id = %room_id,
            from_user_id = %from_user_id,
            to_user_id = %to_user_id,
            sdp_mid = ?candidate.sdp_mid,
            "ICE candidate received"
        );
        record("ice_candidate", Ok(()))
    }
}
