//! HTTP surface tests driven through `tower::ServiceExt::oneshot`

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use webmeet_api::create_router;
use webmeet_core::config::JanusConfig;
use webmeet_core::{Config, ConnectionId, RoomId, UserId};
use webmeet_hub::{HubHandle, Message, PeerHandle};
use webmeet_sfu::{JanusClient, SignalingCoordinator};

struct TestApp {
    router: Router,
    hub: HubHandle,
    shutdown: CancellationToken,
}

impl TestApp {
    fn new(coordinator: Option<Arc<SignalingCoordinator>>) -> Self {
        let config = Config::default();
        let shutdown = CancellationToken::new();
        let (hub, _task) = webmeet_hub::spawn(&config.hub, None, shutdown.clone());
        let router = create_router(hub.clone(), coordinator, Arc::new(config));
        Self {
            router,
            hub,
            shutdown,
        }
    }

    async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    /// Register a channel-backed peer and optionally join it to a room
    async fn connect(&self, user: &str, room: Option<&str>) -> mpsc::Receiver<Message> {
        let (sender, mut rx) = mpsc::channel(16);
        let connection_id = ConnectionId::new();
        self.hub
            .register(PeerHandle {
                connection_id: connection_id.clone(),
                user_id: UserId::from(user),
                display_name: user.to_string(),
                sender,
            })
            .await
            .unwrap();
        let welcome = recv(&mut rx).await.expect("connection ack");
        assert_eq!(welcome.payload.kind(), "success");

        if let Some(room) = room {
            let text = json!({
                "type": "join-room",
                "roomId": room,
                "userId": user,
                "data": {"roomId": room, "userId": user},
            })
            .to_string();
            let message = Message::from_client(&text, &UserId::from(user)).unwrap();
            self.hub
                .send_to_room(RoomId::from(room), Some(connection_id), message)
                .await
                .unwrap();
            let ack = recv(&mut rx).await.expect("room-joined");
            assert_eq!(ack.payload.kind(), "room-joined");
        }
        rx
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn recv(rx: &mut mpsc::Receiver<Message>) -> Option<Message> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a message")
}

fn coordinator() -> Arc<SignalingCoordinator> {
    // Never contacted: stats on an empty coordinator are answered locally
    let config = JanusConfig {
        enabled: true,
        base_url: "http://127.0.0.1:9".to_string(),
        ..JanusConfig::default()
    };
    let client = JanusClient::new(&config).unwrap();
    Arc::new(SignalingCoordinator::new(Arc::new(client)))
}

#[tokio::test]
async fn test_health_reports_ok() {
    let app = TestApp::new(None);
    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "websocket-server");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_metrics_exposes_http_counters() {
    let app = TestApp::new(None);
    app.get("/health").await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("http_requests_total"));
}

#[tokio::test]
async fn test_websocket_requires_identity() {
    let app = TestApp::new(None);

    let (status, body) = app.get("/ws").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "User ID is required");

    let (status, body) = app.get("/ws/auth").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authorization token is required");
}

#[tokio::test]
async fn test_websocket_with_identity_requires_upgrade() {
    let app = TestApp::new(None);

    // Identity is accepted; the plain GET then fails the upgrade handshake
    let (status, body) = app.get("/ws?userId=u1").await;
    assert!(status.is_client_error());
    assert_ne!(body["error"], "User ID is required");

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/ws")
                .header("X-User-ID", "u1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_ne!(body["error"], "User ID is required");
}

#[tokio::test]
async fn test_stats_and_membership_queries() {
    let app = TestApp::new(None);
    let _alice = app.connect("alice", Some("r1")).await;
    let _bob = app.connect("bob", None).await;

    let (status, body) = app.get("/api/v1/websocket/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected_clients"], 2);
    assert_eq!(body["active_rooms"], 1);
    assert_eq!(body["server_status"], "running");

    let (status, body) = app.get("/api/v1/websocket/rooms/r1/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"roomId": "r1", "users": ["alice"], "count": 1}));

    let (_, body) = app.get("/api/v1/websocket/users/alice/rooms").await;
    assert_eq!(body, json!({"userId": "alice", "rooms": ["r1"], "count": 1}));

    let (_, body) = app.get("/api/v1/websocket/users/bob/rooms").await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_signaling_stats_unavailable_without_relay() {
    let app = TestApp::new(None);

    let (status, body) = app.get("/api/v1/signaling/stats").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], 503);
}

#[tokio::test]
async fn test_signaling_stats_with_empty_relay() {
    let app = TestApp::new(Some(coordinator()));

    let (status, body) = app.get("/api/v1/signaling/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["room_count"], 0);

    let (status, body) = app.get("/api/v1/signaling/rooms/r1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["room_id"], "r1");
    assert_eq!(body["exists"], false);

    let (status, body) = app.get("/api/v1/signaling/users/alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rooms"], json!([]));
}

#[tokio::test]
async fn test_admin_direct_message() {
    let app = TestApp::new(None);
    let mut alice = app.connect("alice", None).await;
    let payload = json!({"type": "notice", "data": {"text": "maintenance"}});

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/websocket/admin/users/alice/message",
            Some(payload.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Message sent to user");
    assert_eq!(body["userId"], "alice");
    assert_eq!(body["type"], "notice");

    let delivered = recv(&mut alice).await.expect("notice");
    let envelope = delivered.to_envelope().unwrap();
    assert_eq!(envelope.kind, "notice");
    assert_eq!(envelope.data["text"], "maintenance");

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/websocket/admin/users/nobody/message",
            Some(payload),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found or not connected");
}

#[tokio::test]
async fn test_admin_room_broadcast_reaches_members_only() {
    let app = TestApp::new(None);
    let mut alice = app.connect("alice", Some("r1")).await;
    let mut bob = app.connect("bob", None).await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/websocket/admin/rooms/r1/broadcast",
            Some(json!({"type": "announcement", "data": {"text": "hello"}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["roomId"], "r1");

    let delivered = recv(&mut alice).await.expect("announcement");
    assert_eq!(delivered.payload.kind(), "announcement");
    assert_eq!(delivered.room_id, Some(RoomId::from("r1")));

    // A hub-wide broadcast afterwards is the first thing bob sees
    app.request(
        Method::POST,
        "/api/v1/websocket/admin/broadcast",
        Some(json!({"type": "ping-all", "data": {}})),
    )
    .await;
    let first = recv(&mut bob).await.expect("broadcast");
    assert_eq!(first.payload.kind(), "ping-all");
}

#[tokio::test]
async fn test_admin_rejects_incomplete_body() {
    let app = TestApp::new(None);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/websocket/admin/broadcast",
            Some(json!({"type": "notice"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(Method::POST, "/api/v1/websocket/admin/broadcast", Some(json!("nope")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_disconnect_user() {
    let app = TestApp::new(None);
    let mut alice = app.connect("alice", None).await;

    let (status, body) = app
        .request(Method::DELETE, "/api/v1/websocket/admin/users/alice/disconnect", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "User disconnected", "userId": "alice"}));

    // The hub dropped the only sender of alice's queue
    assert!(recv(&mut alice).await.is_none());

    let (status, _) = app
        .request(Method::DELETE, "/api/v1/websocket/admin/users/alice/disconnect", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
