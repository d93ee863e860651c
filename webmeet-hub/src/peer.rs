//! Reader and writer pumps for one transport connection
//!
//! The pumps are generic over [`FrameReader`] / [`FrameWriter`] so the same
//! logic runs on an axum WebSocket and on in-memory channels. A per-peer
//! cancellation token links them: when either pump ends, the other stops.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use webmeet_core::config::WebSocketConfig;
use webmeet_core::{ConnectionId, UserId};

use crate::hub::{HubError, HubHandle, PeerHandle};
use crate::message::{Message, ProtocolError};

/// Transport-level frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Io(String),
}

#[async_trait]
pub trait FrameReader: Send {
    /// Next inbound frame; `None` once the stream has ended
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;
}

#[async_trait]
pub trait FrameWriter: Send {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError>;
}

/// Timing and queue limits for a peer connection
#[derive(Debug, Clone)]
pub struct PeerOptions {
    pub write_wait: Duration,
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub queue_capacity: usize,
}

impl From<&WebSocketConfig> for PeerOptions {
    fn from(config: &WebSocketConfig) -> Self {
        Self {
            write_wait: config.write_wait(),
            pong_wait: config.pong_wait(),
            ping_period: config.ping_period(),
            queue_capacity: config.peer_queue_capacity.max(1),
        }
    }
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self::from(&WebSocketConfig::default())
    }
}

/// Run one connection to completion
///
/// Registers the peer, spawns the writer and drives the reader on the current
/// task. Returns once both pumps have stopped.
pub async fn serve<R, W>(
    mut reader: R,
    writer: W,
    hub: HubHandle,
    user_id: UserId,
    display_name: String,
    options: PeerOptions,
) -> Result<(), HubError>
where
    R: FrameReader,
    W: FrameWriter + 'static,
{
    let connection_id = ConnectionId::new();
    let (sender, queue) = mpsc::channel(options.queue_capacity);
    let cancel = CancellationToken::new();

    hub.register(PeerHandle {
        connection_id: connection_id.clone(),
        user_id: user_id.clone(),
        display_name,
        sender,
    })
    .await?;
    info!(
        connection_id = %connection_id,
        user_id = %user_id,
        "Peer connected"
    );

    let write_task = tokio::spawn(write_pump(
        writer,
        queue,
        options.clone(),
        cancel.clone(),
        connection_id.clone(),
    ));

    read_pump(
        &mut reader,
        &hub,
        &connection_id,
        &user_id,
        options.pong_wait,
        &cancel,
    )
    .await;

    // The hub may already have dropped the peer; unregister is idempotent
    let _ = hub.unregister(connection_id.clone()).await;
    cancel.cancel();
    if let Err(e) = write_task.await {
        error!(connection_id = %connection_id, error = %e, "Writer task failed");
    }

    info!(
        connection_id = %connection_id,
        user_id = %user_id,
        "Peer disconnected"
    );
    Ok(())
}

/// Read frames until the transport ends, the read deadline passes or the peer
/// is cancelled
///
/// Every inbound frame, including ping and pong, resets the deadline.
pub async fn read_pump<R: FrameReader + ?Sized>(
    reader: &mut R,
    hub: &HubHandle,
    connection_id: &ConnectionId,
    user_id: &UserId,
    pong_wait: Duration,
    cancel: &CancellationToken,
) {
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break,
            next = timeout(pong_wait, reader.next_frame()) => next,
        };

        let text = match next {
            Err(_) => {
                info!(connection_id = %connection_id, "Read deadline exceeded");
                break;
            }
            Ok(None | Some(Ok(Frame::Close))) => {
                debug!(connection_id = %connection_id, "Peer closed the connection");
                break;
            }
            Ok(Some(Err(e))) => {
                warn!(connection_id = %connection_id, error = %e, "Read failed");
                break;
            }
            Ok(Some(Ok(Frame::Ping(_) | Frame::Pong(_)))) => continue,
            Ok(Some(Ok(Frame::Text(text)))) => text,
            Ok(Some(Ok(Frame::Binary(bytes)))) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    if reject(hub, connection_id, &ProtocolError::InvalidFormat)
                        .await
                        .is_err()
                    {
                        break;
                    }
                    continue;
                }
            },
        };

        let delivered = match Message::from_client(&text, user_id) {
            Ok(message) => {
                let Some(room_id) = message.room_id.clone() else {
                    continue;
                };
                hub.send_to_room(room_id, Some(connection_id.clone()), message)
                    .await
            }
            Err(e) => reject(hub, connection_id, &e).await,
        };
        if delivered.is_err() {
            warn!(connection_id = %connection_id, "Hub stopped, closing peer");
            break;
        }
    }
}

async fn reject(
    hub: &HubHandle,
    connection_id: &ConnectionId,
    error: &ProtocolError,
) -> Result<(), HubError> {
    debug!(connection_id = %connection_id, error = %error, "Rejecting message");
    hub.reject(connection_id.clone(), error.to_message()).await
}

/// Write queued messages and heartbeats until the queue closes or the peer is
/// cancelled, then send a close frame
pub async fn write_pump<W: FrameWriter>(
    mut writer: W,
    mut queue: mpsc::Receiver<Message>,
    options: PeerOptions,
    cancel: CancellationToken,
    connection_id: ConnectionId,
) {
    let mut ticker = interval_at(Instant::now() + options.ping_period, options.ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => {
                close(&mut writer, options.write_wait).await;
                break;
            }
            message = queue.recv() => match message {
                Some(message) => match message.encode() {
                    Ok(text) => Frame::Text(text),
                    Err(e) => {
                        error!(connection_id = %connection_id, error = %e, "Failed to encode message");
                        continue;
                    }
                },
                None => {
                    debug!(connection_id = %connection_id, "Outbound queue closed");
                    close(&mut writer, options.write_wait).await;
                    break;
                }
            },
            _ = ticker.tick() => Frame::Ping(Vec::new()),
        };

        match timeout(options.write_wait, writer.send_frame(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(connection_id = %connection_id, error = %e, "Write failed");
                break;
            }
            Err(_) => {
                warn!(connection_id = %connection_id, "Write deadline exceeded");
                break;
            }
        }
    }

    cancel.cancel();
}

async fn close<W: FrameWriter>(writer: &mut W, write_wait: Duration) {
    let _ = timeout(write_wait, writer.send_frame(Frame::Close)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use webmeet_core::config::HubConfig;

    struct ChannelReader(mpsc::UnboundedReceiver<Result<Frame, TransportError>>);

    #[async_trait]
    impl FrameReader for ChannelReader {
        async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
            self.0.recv().await
        }
    }

    struct ChannelWriter(mpsc::UnboundedSender<Frame>);

    #[async_trait]
    impl FrameWriter for ChannelWriter {
        async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
            self.0.send(frame).map_err(|_| TransportError::Closed)
        }
    }

    struct Client {
        inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
        outbound: mpsc::UnboundedReceiver<Frame>,
        task: tokio::task::JoinHandle<Result<(), HubError>>,
    }

    impl Client {
        fn connect(hub: &HubHandle, user: &str, options: PeerOptions) -> Self {
            let (inbound, reader_rx) = mpsc::unbounded_channel();
            let (writer_tx, outbound) = mpsc::unbounded_channel();
            let task = tokio::spawn(serve(
                ChannelReader(reader_rx),
                ChannelWriter(writer_tx),
                hub.clone(),
                UserId::from(user),
                user.to_string(),
                options,
            ));
            Self {
                inbound,
                outbound,
                task,
            }
        }

        fn send(&self, value: Value) {
            self.inbound
                .send(Ok(Frame::Text(value.to_string())))
                .unwrap();
        }

        async fn frame(&mut self) -> Frame {
            tokio::time::timeout(Duration::from_secs(30), self.outbound.recv())
                .await
                .unwrap()
                .unwrap()
        }

        async fn json(&mut self) -> Value {
            loop {
                match self.frame().await {
                    Frame::Text(text) => return serde_json::from_str(&text).unwrap(),
                    Frame::Ping(_) => continue,
                    other => panic!("unexpected frame {other:?}"),
                }
            }
        }
    }

    fn start_hub() -> (HubHandle, CancellationToken) {
        let shutdown = CancellationToken::new();
        let (hub, _task) = crate::hub::spawn(&HubConfig::default(), None, shutdown.clone());
        (hub, shutdown)
    }

    #[tokio::test]
    async fn test_connect_and_join() {
        let (hub, _shutdown) = start_hub();
        let mut client = Client::connect(&hub, "u1", PeerOptions::default());

        let hello = client.json().await;
        assert_eq!(hello["type"], "success");
        assert_eq!(hello["data"]["message"], "Connected to WebSocket server");

        client.send(json!({"type": "join-room", "data": {"roomId": "r1", "userId": "u1"}}));
        let joined = client.json().await;
        assert_eq!(joined["type"], "room-joined");
        assert_eq!(joined["data"]["users"], json!(["u1"]));
    }

    #[tokio::test]
    async fn test_rejected_message_keeps_connection_open() {
        let (hub, _shutdown) = start_hub();
        let mut client = Client::connect(&hub, "u1", PeerOptions::default());
        client.json().await;

        client.send(json!({"type": "join-room", "data": {"roomId": "r1", "userId": "u2"}}));
        let error = client.json().await;
        assert_eq!(error["type"], "error");
        assert_eq!(error["data"]["code"], 403);
        assert_eq!(error["data"]["message"], "User ID mismatch");

        client.inbound.send(Ok(Frame::Text("{".into()))).unwrap();
        let error = client.json().await;
        assert_eq!(error["data"]["code"], 400);
        assert_eq!(error["data"]["message"], "Invalid message format");

        client.send(json!({"type": "join-room", "data": {"roomId": "r1", "userId": "u1"}}));
        assert_eq!(client.json().await["type"], "room-joined");
    }

    #[tokio::test]
    async fn test_replies_follow_frame_order() {
        let (hub, _shutdown) = start_hub();
        let mut client = Client::connect(&hub, "u1", PeerOptions::default());
        client.json().await;

        // Both frames are queued before the hub sees either of them
        client.inbound.send(Ok(Frame::Text("{".into()))).unwrap();
        client.send(json!({"type": "join-room", "data": {"roomId": "r1", "userId": "u1"}}));
        client.send(json!({"type": "leave-room", "data": {"roomId": "r1", "userId": "u2"}}));

        let kinds = vec![
            client.json().await["type"].clone(),
            client.json().await["type"].clone(),
            client.json().await["type"].clone(),
        ];
        assert_eq!(kinds, vec![json!("error"), json!("room-joined"), json!("error")]);
    }

    #[tokio::test]
    async fn test_transport_end_unregisters_peer() {
        let (hub, _shutdown) = start_hub();
        let mut client = Client::connect(&hub, "u1", PeerOptions::default());
        client.json().await;
        assert_eq!(hub.peer_count().await.unwrap(), 1);

        client.inbound.send(Ok(Frame::Close)).unwrap();
        assert_eq!(client.frame().await, Frame::Close);
        client.task.await.unwrap().unwrap();
        assert_eq!(hub.peer_count().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_and_read_deadline() {
        let (hub, _shutdown) = start_hub();
        let options = PeerOptions {
            write_wait: Duration::from_secs(1),
            pong_wait: Duration::from_secs(10),
            ping_period: Duration::from_secs(9),
            queue_capacity: 16,
        };
        let mut client = Client::connect(&hub, "u1", options);
        client.json().await;

        assert_eq!(client.frame().await, Frame::Ping(Vec::new()));

        // A pong resets the read deadline
        client.inbound.send(Ok(Frame::Pong(Vec::new()))).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!client.task.is_finished());

        // Nothing else arrives: the reader gives up and the writer closes
        loop {
            match client.frame().await {
                Frame::Ping(_) => continue,
                frame => {
                    assert_eq!(frame, Frame::Close);
                    break;
                }
            }
        }
        client.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_closes_queue() {
        let (hub, _shutdown) = start_hub();
        let mut client = Client::connect(&hub, "u1", PeerOptions::default());
        client.json().await;

        assert_eq!(hub.disconnect_user(UserId::from("u1")).await.unwrap(), 1);
        assert_eq!(client.frame().await, Frame::Close);
        client.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_binary_frames_are_decoded_as_text() {
        let (hub, _shutdown) = start_hub();
        let mut client = Client::connect(&hub, "u1", PeerOptions::default());
        client.json().await;

        let body = json!({"type": "join-room", "data": {"roomId": "r1", "userId": "u1"}});
        client
            .inbound
            .send(Ok(Frame::Binary(body.to_string().into_bytes())))
            .unwrap();
        assert_eq!(client.json().await["type"], "room-joined");

        client.inbound.send(Ok(Frame::Binary(vec![0xff, 0xfe]))).unwrap();
        let error = client.json().await;
        assert_eq!(error["data"]["message"], "Invalid message format");
    }

    #[test]
    fn test_options_from_config() {
        let options = PeerOptions::from(&WebSocketConfig::default());
        assert_eq!(options.pong_wait, Duration::from_secs(60));
        assert_eq!(options.ping_period, Duration::from_secs(54));
        assert_eq!(options.write_wait, Duration::from_secs(10));
    }
}
