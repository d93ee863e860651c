//! Connection registry actor
//!
//! The [`Hub`] owns who is connected and who is in which room. Every mutation
//! arrives over one of its channels and is applied by a single loop, so the
//! membership maps need no locks. Sends to peers are `try_send`; a peer whose
//! queue is full or closed is evicted once the current event is handled.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webmeet_core::config::HubConfig;
use webmeet_core::metrics::hub as metrics;
use webmeet_core::{ConnectionId, RoomId, SignalingHandler, UserId};

use crate::dispatcher::{Dispatcher, SignalingCall};
use crate::message::{Message, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("hub is not running")]
    Closed,
}

/// Registration record for one transport connection
#[derive(Debug)]
pub struct PeerHandle {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub display_name: String,
    /// The only sender of the peer's outbound queue
    pub sender: mpsc::Sender<Message>,
}

/// A message routed to a room
#[derive(Debug)]
pub struct RoomMessage {
    pub room_id: RoomId,
    /// Connection that produced the message; `None` for operator messages
    pub origin: Option<ConnectionId>,
    pub message: Message,
}

/// Everything a connection produces shares one channel, so the replies a peer
/// sees follow the order of its frames
#[derive(Debug)]
enum Inbound {
    Room(RoomMessage),
    Reject {
        connection_id: ConnectionId,
        message: Message,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Connection(ConnectionId),
    /// First connection bound to this user
    User(UserId),
}

#[derive(Debug)]
pub struct DirectMessage {
    pub target: Target,
    pub message: Message,
}

#[derive(Debug)]
enum Query {
    PeerCount(oneshot::Sender<usize>),
    RoomCount(oneshot::Sender<usize>),
    RoomUsers(RoomId, oneshot::Sender<Vec<UserId>>),
    UserRooms(UserId, oneshot::Sender<Vec<RoomId>>),
    IsUserInRoom(RoomId, UserId, oneshot::Sender<bool>),
    UserConnected(UserId, oneshot::Sender<bool>),
    DisconnectUser(UserId, oneshot::Sender<usize>),
}

/// Cloneable front door to a running hub
#[derive(Debug, Clone)]
pub struct HubHandle {
    register: mpsc::Sender<PeerHandle>,
    unregister: mpsc::Sender<ConnectionId>,
    broadcast: mpsc::Sender<Message>,
    room: mpsc::Sender<Inbound>,
    direct: mpsc::Sender<DirectMessage>,
    query: mpsc::Sender<Query>,
}

impl HubHandle {
    pub async fn register(&self, peer: PeerHandle) -> Result<(), HubError> {
        self.register.send(peer).await.map_err(|_| HubError::Closed)
    }

    pub async fn unregister(&self, connection_id: ConnectionId) -> Result<(), HubError> {
        self.unregister
            .send(connection_id)
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Deliver `message` to every connected peer
    pub async fn broadcast(&self, message: Message) -> Result<(), HubError> {
        self.broadcast
            .send(message)
            .await
            .map_err(|_| HubError::Closed)
    }

    pub async fn send_to_room(
        &self,
        room_id: RoomId,
        origin: Option<ConnectionId>,
        message: Message,
    ) -> Result<(), HubError> {
        self.room
            .send(Inbound::Room(RoomMessage {
                room_id,
                origin,
                message,
            }))
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Reply to a connection whose frame was refused
    ///
    /// Queued behind that connection's earlier room messages.
    pub async fn reject(
        &self,
        connection_id: ConnectionId,
        message: Message,
    ) -> Result<(), HubError> {
        self.room
            .send(Inbound::Reject {
                connection_id,
                message,
            })
            .await
            .map_err(|_| HubError::Closed)
    }

    pub async fn send_direct(&self, target: Target, message: Message) -> Result<(), HubError> {
        self.direct
            .send(DirectMessage { target, message })
            .await
            .map_err(|_| HubError::Closed)
    }

    async fn ask<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Query) -> Result<T, HubError> {
        let (tx, rx) = oneshot::channel();
        self.query
            .send(build(tx))
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    pub async fn peer_count(&self) -> Result<usize, HubError> {
        self.ask(Query::PeerCount).await
    }

    pub async fn room_count(&self) -> Result<usize, HubError> {
        self.ask(Query::RoomCount).await
    }

    /// Distinct users in a room, sorted
    pub async fn room_users(&self, room_id: RoomId) -> Result<Vec<UserId>, HubError> {
        self.ask(|tx| Query::RoomUsers(room_id, tx)).await
    }

    /// Rooms joined by any connection of `user_id`, sorted
    pub async fn user_rooms(&self, user_id: UserId) -> Result<Vec<RoomId>, HubError> {
        self.ask(|tx| Query::UserRooms(user_id, tx)).await
    }

    pub async fn is_user_in_room(&self, room_id: RoomId, user_id: UserId) -> Result<bool, HubError> {
        self.ask(|tx| Query::IsUserInRoom(room_id, user_id, tx))
            .await
    }

    pub async fn is_user_connected(&self, user_id: UserId) -> Result<bool, HubError> {
        self.ask(|tx| Query::UserConnected(user_id, tx)).await
    }

    /// Drop every connection bound to `user_id`, returning how many were closed
    pub async fn disconnect_user(&self, user_id: UserId) -> Result<usize, HubError> {
        self.ask(|tx| Query::DisconnectUser(user_id, tx)).await
    }
}

struct HubReceivers {
    register: mpsc::Receiver<PeerHandle>,
    unregister: mpsc::Receiver<ConnectionId>,
    broadcast: mpsc::Receiver<Message>,
    room: mpsc::Receiver<Inbound>,
    direct: mpsc::Receiver<DirectMessage>,
    query: mpsc::Receiver<Query>,
}

struct PeerState {
    handle: PeerHandle,
    rooms: HashSet<RoomId>,
}

/// The registry actor
pub struct Hub {
    peers: HashMap<ConnectionId, PeerState>,
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    dispatcher: Option<Dispatcher>,
    pending_evictions: Vec<(ConnectionId, &'static str)>,
    receivers: Option<HubReceivers>,
}

impl Hub {
    /// Build a hub and the handle used to reach it
    ///
    /// Without a handler the hub only relays signaling between peers.
    #[must_use]
    pub fn new(
        config: &HubConfig,
        handler: Option<Arc<dyn SignalingHandler>>,
    ) -> (Self, HubHandle) {
        let capacity = config.channel_capacity.max(1);
        let (register_tx, register_rx) = mpsc::channel(capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(capacity);
        let (room_tx, room_rx) = mpsc::channel(capacity);
        let (direct_tx, direct_rx) = mpsc::channel(capacity);
        let (query_tx, query_rx) = mpsc::channel(capacity);

        let hub = Self {
            peers: HashMap::new(),
            rooms: HashMap::new(),
            dispatcher: handler
                .map(|handler| {
                    Dispatcher::new(
                        handler,
                        config.signaling_worker_idle(),
                        config.signaling_queue_capacity,
                    )
                }),
            pending_evictions: Vec::new(),
            receivers: Some(HubReceivers {
                register: register_rx,
                unregister: unregister_rx,
                broadcast: broadcast_rx,
                room: room_rx,
                direct: direct_rx,
                query: query_rx,
            }),
        };
        let handle = HubHandle {
            register: register_tx,
            unregister: unregister_tx,
            broadcast: broadcast_tx,
            room: room_tx,
            direct: direct_tx,
            query: query_tx,
        };
        (hub, handle)
    }

    /// Process events until `shutdown` fires or every handle is dropped
    pub async fn run(mut self, shutdown: CancellationToken) {
        let Some(mut rx) = self.receivers.take() else {
            return;
        };
        info!("Starting connection hub");

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break,
                Some(peer) = rx.register.recv() => self.register_peer(peer),
                Some(connection_id) = rx.unregister.recv() => self.unregister_peer(&connection_id),
                Some(message) = rx.broadcast.recv() => self.broadcast(message),
                Some(inbound) = rx.room.recv() => match inbound {
                    Inbound::Room(room_message) => self.route_room_message(room_message),
                    Inbound::Reject { connection_id, message } => {
                        self.deliver(&connection_id, message);
                    }
                },
                Some(direct) = rx.direct.recv() => self.send_direct(direct),
                Some(query) = rx.query.recv() => self.answer(query),
                else => break,
            }
            self.drain_evictions();
        }

        self.shutdown().await;
        info!("Connection hub stopped");
    }

    fn register_peer(&mut self, peer: PeerHandle) {
        let connection_id = peer.connection_id.clone();
        info!(
            connection_id = %connection_id,
            user_id = %peer.user_id,
            "Registering peer"
        );

        self.peers.insert(
            connection_id.clone(),
            PeerState {
                handle: peer,
                rooms: HashSet::new(),
            },
        );
        self.update_gauges();
        self.deliver(&connection_id, Message::success("Connected to WebSocket server"));
    }

    fn unregister_peer(&mut self, connection_id: &ConnectionId) {
        if self.peers.contains_key(connection_id) {
            info!(connection_id = %connection_id, "Unregistering peer");
            self.remove_peer(connection_id);
        }
    }

    /// Remove a peer and every membership it holds
    ///
    /// Dropping the peer's state drops the only sender of its queue, which
    /// closes the queue exactly once. Idempotent.
    fn remove_peer(&mut self, connection_id: &ConnectionId) {
        let Some(peer) = self.peers.remove(connection_id) else {
            return;
        };
        let user_id = peer.handle.user_id.clone();

        let mut rooms: Vec<RoomId> = peer.rooms.into_iter().collect();
        rooms.sort();
        for room_id in rooms {
            self.detach_from_room(&room_id, connection_id);
            if !self.is_user_in_room(&room_id, &user_id) {
                self.broadcast_to_room(
                    &room_id,
                    &Message::user_left(room_id.clone(), user_id.clone()),
                    None,
                );
                self.dispatch(
                    room_id,
                    SignalingCall::Leave {
                        user_id: user_id.clone(),
                    },
                );
            }
        }
        self.update_gauges();
    }

    fn detach_from_room(&mut self, room_id: &RoomId, connection_id: &ConnectionId) {
        if let Some(members) = self.rooms.get_mut(room_id) {
            members.remove(connection_id);
            if members.is_empty() {
                self.rooms.remove(room_id);
            }
        }
    }

    fn broadcast(&mut self, message: Message) {
        debug!(kind = message.payload.kind(), "Broadcasting message");
        let targets: Vec<ConnectionId> = self.peers.keys().cloned().collect();
        for connection_id in targets {
            self.deliver(&connection_id, message.clone());
        }
    }

    fn route_room_message(&mut self, room_message: RoomMessage) {
        let RoomMessage {
            room_id,
            origin,
            message,
        } = room_message;
        debug!(
            room_id = %room_id,
            kind = message.payload.kind(),
            "Handling room message"
        );

        match message.payload {
            Payload::JoinRoom(_) | Payload::LeaveRoom(_) => {
                let Some(origin) = origin else {
                    warn!(room_id = %room_id, "Membership change without a connection, ignoring");
                    return;
                };
                if matches!(message.payload, Payload::JoinRoom(_)) {
                    self.join_room(room_id, &origin);
                } else {
                    self.leave_room(room_id, &origin);
                }
            }
            Payload::Offer(_) | Payload::Answer(_) | Payload::IceCandidate(_) => {
                self.relay(room_id, message);
            }
            _ => self.broadcast_to_room(&room_id, &message, None),
        }
    }

    fn join_room(&mut self, room_id: RoomId, origin: &ConnectionId) {
        let Some(peer) = self.peers.get(origin) else {
            debug!(connection_id = %origin, "Join from unknown connection");
            return;
        };
        let user_id = peer.handle.user_id.clone();
        let display_name = peer.handle.display_name.clone();
        let newly_present = !self.is_user_in_room(&room_id, &user_id);

        if let Some(peer) = self.peers.get_mut(origin) {
            if peer.rooms.insert(room_id.clone()) {
                info!(room_id = %room_id, user_id = %user_id, "User joined room");
            }
        }
        self.rooms
            .entry(room_id.clone())
            .or_default()
            .insert(origin.clone());
        self.update_gauges();

        let users = self.users_in_room(&room_id);
        self.deliver(
            origin,
            Message::room_joined(room_id.clone(), user_id.clone(), users),
        );

        if newly_present {
            self.broadcast_to_room(
                &room_id,
                &Message::user_joined(room_id.clone(), user_id.clone()),
                Some(origin),
            );
            self.dispatch(
                room_id,
                SignalingCall::Join {
                    user_id,
                    display_name,
                },
            );
        }
    }

    fn leave_room(&mut self, room_id: RoomId, origin: &ConnectionId) {
        let Some(peer) = self.peers.get_mut(origin) else {
            debug!(connection_id = %origin, "Leave from unknown connection");
            return;
        };
        let user_id = peer.handle.user_id.clone();
        let was_member = peer.rooms.remove(&room_id);

        if was_member {
            self.detach_from_room(&room_id, origin);
            self.update_gauges();
            info!(room_id = %room_id, user_id = %user_id, "User left room");
        }

        self.deliver(origin, Message::room_left(room_id.clone(), user_id.clone()));

        if was_member && !self.is_user_in_room(&room_id, &user_id) {
            self.broadcast_to_room(
                &room_id,
                &Message::user_left(room_id.clone(), user_id.clone()),
                None,
            );
            self.dispatch(room_id, SignalingCall::Leave { user_id });
        }
    }

    /// Hand offer/answer/ICE to the coordinator and forward a copy to the recipient
    fn relay(&mut self, room_id: RoomId, message: Message) {
        let Some(from) = message.sender.clone() else {
            warn!(room_id = %room_id, "Signaling message without a sender, dropping");
            return;
        };

        let call = match &message.payload {
            Payload::Offer(d) => SignalingCall::Offer {
                from,
                sdp: d.sdp.clone(),
            },
            Payload::Answer(d) => SignalingCall::Answer {
                from,
                to: d.to_user_id.clone(),
                sdp: d.sdp.clone(),
            },
            Payload::IceCandidate(d) => SignalingCall::IceCandidate {
                from,
                to: d.to_user_id.clone(),
                candidate: d.to_candidate(),
            },
            _ => return,
        };
        self.dispatch(room_id.clone(), call);

        let Some(recipient) = message.recipient() else {
            return;
        };
        let targets: Vec<ConnectionId> = self
            .rooms
            .get(&room_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|id| {
                        self.peers
                            .get(*id)
                            .is_some_and(|peer| &peer.handle.user_id == recipient)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if targets.is_empty() {
            info!(
                room_id = %room_id,
                user_id = %recipient,
                kind = message.payload.kind(),
                "Recipient not in room, dropping message"
            );
            metrics::DROPPED_MESSAGES
                .with_label_values(&["recipient_absent"])
                .inc();
            return;
        }

        for connection_id in targets {
            self.deliver(&connection_id, message.clone());
        }
    }

    fn send_direct(&mut self, direct: DirectMessage) {
        let connection_id = match &direct.target {
            Target::Connection(id) => self.peers.contains_key(id).then(|| id.clone()),
            Target::User(user_id) => self
                .peers
                .iter()
                .find(|(_, peer)| &peer.handle.user_id == user_id)
                .map(|(id, _)| id.clone()),
        };

        match connection_id {
            Some(id) => {
                self.deliver(&id, direct.message);
            }
            None => {
                debug!(destination = ?direct.target, "Direct message target not connected");
                metrics::DROPPED_MESSAGES
                    .with_label_values(&["target_absent"])
                    .inc();
            }
        }
    }

    fn answer(&mut self, query: Query) {
        // A dropped reply receiver only means the caller gave up
        match query {
            Query::PeerCount(reply) => {
                let _ = reply.send(self.peers.len());
            }
            Query::RoomCount(reply) => {
                let _ = reply.send(self.rooms.len());
            }
            Query::RoomUsers(room_id, reply) => {
                let _ = reply.send(self.users_in_room(&room_id));
            }
            Query::UserRooms(user_id, reply) => {
                let _ = reply.send(self.rooms_of_user(&user_id));
            }
            Query::IsUserInRoom(room_id, user_id, reply) => {
                let _ = reply.send(self.is_user_in_room(&room_id, &user_id));
            }
            Query::UserConnected(user_id, reply) => {
                let connected = self
                    .peers
                    .values()
                    .any(|peer| peer.handle.user_id == user_id);
                let _ = reply.send(connected);
            }
            Query::DisconnectUser(user_id, reply) => {
                let targets: Vec<ConnectionId> = self
                    .peers
                    .iter()
                    .filter(|(_, peer)| peer.handle.user_id == user_id)
                    .map(|(id, _)| id.clone())
                    .collect();
                for connection_id in &targets {
                    info!(
                        connection_id = %connection_id,
                        user_id = %user_id,
                        "Disconnecting peer on request"
                    );
                    self.remove_peer(connection_id);
                }
                let _ = reply.send(targets.len());
            }
        }
    }

    /// Non-blocking send; a full or closed queue schedules the peer for eviction
    fn deliver(&mut self, connection_id: &ConnectionId, message: Message) -> bool {
        let Some(peer) = self.peers.get(connection_id) else {
            return false;
        };

        let reason = match peer.handle.sender.try_send(message) {
            Ok(()) => return true,
            Err(mpsc::error::TrySendError::Full(_)) => "queue_full",
            Err(mpsc::error::TrySendError::Closed(_)) => "queue_closed",
        };
        if !self
            .pending_evictions
            .iter()
            .any(|(id, _)| id == connection_id)
        {
            self.pending_evictions.push((connection_id.clone(), reason));
        }
        false
    }

    fn broadcast_to_room(
        &mut self,
        room_id: &RoomId,
        message: &Message,
        exclude: Option<&ConnectionId>,
    ) {
        let targets: Vec<ConnectionId> = self
            .rooms
            .get(room_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|id| Some(*id) != exclude)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        for connection_id in targets {
            self.deliver(&connection_id, message.clone());
        }
    }

    /// Evict slow or dead consumers, including any found while evicting
    fn drain_evictions(&mut self) {
        while let Some((connection_id, reason)) = self.pending_evictions.pop() {
            if let Some(peer) = self.peers.get(&connection_id) {
                warn!(
                    connection_id = %connection_id,
                    user_id = %peer.handle.user_id,
                    reason,
                    "Evicting peer"
                );
                metrics::PEER_EVICTIONS.with_label_values(&[reason]).inc();
                self.remove_peer(&connection_id);
            }
        }
    }

    fn dispatch(&mut self, room_id: RoomId, call: SignalingCall) {
        if let Some(dispatcher) = self.dispatcher.as_mut() {
            dispatcher.dispatch(room_id, call);
        }
    }

    fn is_user_in_room(&self, room_id: &RoomId, user_id: &UserId) -> bool {
        self.rooms.get(room_id).is_some_and(|members| {
            members.iter().any(|id| {
                self.peers
                    .get(id)
                    .is_some_and(|peer| &peer.handle.user_id == user_id)
            })
        })
    }

    fn users_in_room(&self, room_id: &RoomId) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .rooms
            .get(room_id)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| self.peers.get(id))
                    .map(|peer| peer.handle.user_id.clone())
                    .collect()
            })
            .unwrap_or_default();
        users.sort();
        users.dedup();
        users
    }

    fn rooms_of_user(&self, user_id: &UserId) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self
            .peers
            .values()
            .filter(|peer| &peer.handle.user_id == user_id)
            .flat_map(|peer| peer.rooms.iter().cloned())
            .collect();
        rooms.sort();
        rooms.dedup();
        rooms
    }

    fn update_gauges(&self) {
        metrics::CONNECTED_PEERS.set(i64::try_from(self.peers.len()).unwrap_or(i64::MAX));
        metrics::ACTIVE_ROOMS.set(i64::try_from(self.rooms.len()).unwrap_or(i64::MAX));
    }

    /// Close every queue and release relay resources held by connected users
    async fn shutdown(mut self) {
        let mut leaves: Vec<(RoomId, UserId)> = self
            .peers
            .drain()
            .flat_map(|(_, peer)| {
                let user_id = peer.handle.user_id;
                peer.rooms
                    .into_iter()
                    .map(move |room_id| (room_id, user_id.clone()))
            })
            .collect();
        leaves.sort();
        leaves.dedup();
        self.rooms.clear();
        self.pending_evictions.clear();
        self.update_gauges();

        info!(sessions = leaves.len(), "Hub shutting down");
        if let Some(mut dispatcher) = self.dispatcher.take() {
            for (room_id, user_id) in leaves {
                dispatcher
                    .dispatch_wait(room_id, SignalingCall::Leave { user_id })
                    .await;
            }
            dispatcher.shutdown().await;
        }
    }
}

/// Spawn a hub on the current runtime
pub fn spawn(
    config: &HubConfig,
    handler: Option<Arc<dyn SignalingHandler>>,
    shutdown: CancellationToken,
) -> (HubHandle, JoinHandle<()>) {
    let (hub, handle) = Hub::new(config, handler);
    let task = tokio::spawn(hub.run(shutdown));
    (handle, task)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(user: &str, capacity: usize) -> (PeerHandle, mpsc::Receiver<Message>) {
        let (sender, rx) = mpsc::channel(capacity);
        let handle = PeerHandle {
            connection_id: ConnectionId::new(),
            user_id: UserId::from(user),
            display_name: user.to_string(),
            sender,
        };
        (handle, rx)
    }

    fn join(room: &str, user: &str) -> Message {
        Message::new(Payload::JoinRoom(crate::message::RoomUser {
            room_id: RoomId::from(room),
            user_id: UserId::from(user),
        }))
        .in_room(RoomId::from(room))
        .from_user(UserId::from(user))
    }

    #[test]
    fn test_membership_is_symmetric() {
        let (mut hub, _handle) = Hub::new(&HubConfig::default(), None);
        let (a, _rx_a) = peer("u1", 8);
        let (b, _rx_b) = peer("u2", 8);
        let (a_id, b_id) = (a.connection_id.clone(), b.connection_id.clone());
        hub.register_peer(a);
        hub.register_peer(b);

        hub.join_room(RoomId::from("r1"), &a_id);
        hub.join_room(RoomId::from("r1"), &b_id);
        hub.join_room(RoomId::from("r2"), &b_id);
        hub.leave_room(RoomId::from("r1"), &a_id);

        for (id, peer) in &hub.peers {
            for room in &peer.rooms {
                assert!(hub.rooms[room].contains(id));
            }
        }
        for (room, members) in &hub.rooms {
            for id in members {
                assert!(hub.peers[id].rooms.contains(room));
            }
        }
        assert_eq!(hub.users_in_room(&RoomId::from("r1")), vec![UserId::from("u2")]);
        assert_eq!(
            hub.rooms_of_user(&UserId::from("u2")),
            vec![RoomId::from("r1"), RoomId::from("r2")]
        );
    }

    #[test]
    fn test_full_queue_schedules_eviction() {
        let (mut hub, _handle) = Hub::new(&HubConfig::default(), None);
        // Capacity 1 is taken by the registration ack
        let (slow, _rx) = peer("slow", 1);
        let slow_id = slow.connection_id.clone();
        hub.register_peer(slow);

        assert!(!hub.deliver(&slow_id, Message::success("hello")));
        assert_eq!(hub.pending_evictions, vec![(slow_id.clone(), "queue_full")]);

        hub.drain_evictions();
        assert!(hub.peers.is_empty());
        assert!(hub.pending_evictions.is_empty());
    }

    #[test]
    fn test_route_ignores_membership_change_without_origin() {
        let (mut hub, _handle) = Hub::new(&HubConfig::default(), None);
        hub.route_room_message(RoomMessage {
            room_id: RoomId::from("r1"),
            origin: None,
            message: join("r1", "u1"),
        });
        assert!(hub.rooms.is_empty());
    }

    #[tokio::test]
    async fn test_handle_reports_closed_hub() {
        let (hub, handle) = Hub::new(&HubConfig::default(), None);
        drop(hub);
        assert_eq!(handle.peer_count().await, Err(HubError::Closed));
    }
}
