//! WebSocket upgrade endpoints
//!
//! The socket is split into a reader and a writer and handed to
//! `webmeet_hub::serve`, which owns the connection from then on. Identity is
//! resolved before the upgrade: `/ws` trusts the user id supplied by the
//! boundary layer, `/ws/auth` takes the bearer token itself as the id.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::Response,
    routing::get,
    Router,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Deserialize;
use tracing::{error, info};
use webmeet_core::UserId;
use webmeet_hub::{Frame, FrameReader, FrameWriter, HubHandle, PeerOptions, TransportError};

use crate::http::{AppError, AppResult, AppState};

/// Header carrying the user id when it is not in the query string
pub const USER_ID_HEADER: &str = "x-user-id";

/// Query parameters for `/ws`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
}

/// Query parameters for `/ws/auth`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthQuery {
    pub token: Option<String>,
    pub display_name: Option<String>,
}

pub fn create_websocket_router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/ws/auth", get(authenticated_websocket_handler))
}

/// Upgrade with a user id from `?userId=` or the `X-User-ID` header
pub async fn websocket_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let user_id = non_empty(query.user_id)
        .or_else(|| {
            headers
                .get(USER_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .and_then(|value| non_empty(Some(value)))
        })
        .ok_or_else(|| AppError::bad_request("User ID is required"))?;

    let ws = ws.map_err(rejection_to_error)?;
    Ok(upgrade(ws, state, UserId::from(user_id), query.display_name))
}

/// Upgrade with a token from `?token=` or `Authorization: Bearer`
pub async fn authenticated_websocket_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let token = non_empty(query.token)
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| AppError::unauthorized("Authorization token is required"))?;

    let ws = ws.map_err(rejection_to_error)?;
    Ok(upgrade(ws, state, UserId::from(token), query.display_name))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    non_empty(Some(token.trim().to_string()))
}

fn rejection_to_error(rejection: WebSocketUpgradeRejection) -> AppError {
    AppError::new(rejection.status(), rejection.body_text())
}

fn upgrade(
    ws: WebSocketUpgrade,
    state: AppState,
    user_id: UserId,
    display_name: Option<String>,
) -> Response {
    let options = PeerOptions::from(&state.config.websocket);
    let display_name = non_empty(display_name).unwrap_or_else(|| user_id.to_string());
    let hub = state.hub;

    ws.max_message_size(state.config.websocket.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, hub, user_id, display_name, options))
}

async fn handle_socket(
    socket: WebSocket,
    hub: HubHandle,
    user_id: UserId,
    display_name: String,
    options: PeerOptions,
) {
    info!(user_id = %user_id, "WebSocket upgraded");

    let (sink, stream) = socket.split();
    let reader = SocketReader { stream };
    let writer = SocketWriter { sink };

    if let Err(e) = webmeet_hub::serve(reader, writer, hub, user_id.clone(), display_name, options).await {
        error!(user_id = %user_id, error = %e, "WebSocket session could not start");
    }
}

struct SocketReader {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameReader for SocketReader {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        let message = self.stream.next().await?;
        Some(match message {
            Ok(WsMessage::Text(text)) => Ok(Frame::Text(text.to_string())),
            Ok(WsMessage::Binary(data)) => Ok(Frame::Binary(data.to_vec())),
            Ok(WsMessage::Ping(data)) => Ok(Frame::Ping(data.to_vec())),
            Ok(WsMessage::Pong(data)) => Ok(Frame::Pong(data.to_vec())),
            Ok(WsMessage::Close(_)) => Ok(Frame::Close),
            Err(e) => Err(TransportError::Io(e.to_string())),
        })
    }
}

struct SocketWriter {
    sink: SplitSink<WebSocket, WsMessage>,
}

#[async_trait]
impl FrameWriter for SocketWriter {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => WsMessage::Text(text.into()),
            Frame::Binary(data) => WsMessage::Binary(data.into()),
            Frame::Ping(data) => WsMessage::Ping(data.into()),
            Frame::Pong(data) => WsMessage::Pong(data.into()),
            Frame::Close => WsMessage::Close(None),
        };

        self.sink
            .send(message)
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc".to_string()));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_non_empty_rejects_blank() {
        assert_eq!(non_empty(Some(" ".into())), None);
        assert_eq!(non_empty(Some("u1".into())), Some("u1".into()));
        assert_eq!(non_empty(None), None);
    }
}
