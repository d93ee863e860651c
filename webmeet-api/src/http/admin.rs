//! Operator endpoints: push messages to clients and drop connections

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{delete, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use webmeet_core::{RoomId, UserId};
use webmeet_hub::{Message, Target};

use crate::http::{AppError, AppResult, AppState};

const USER_OFFLINE: &str = "User not found or not connected";

/// Body of every push endpoint; both fields are required
#[derive(Debug, Deserialize)]
pub struct AdminMessageRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Option<Value>,
}

impl AdminMessageRequest {
    fn into_message(self) -> AppResult<Message> {
        let kind = self.kind.trim();
        let data = self.data.filter(|data| !data.is_null());
        match (kind.is_empty(), data) {
            (false, Some(data)) => Ok(Message::custom(kind, data)),
            _ => Err(AppError::bad_request("Both type and data are required")),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/websocket/admin/broadcast", post(broadcast_to_all))
        .route(
            "/api/v1/websocket/admin/rooms/{room_id}/broadcast",
            post(broadcast_to_room),
        )
        .route(
            "/api/v1/websocket/admin/users/{user_id}/message",
            post(send_direct_message),
        )
        .route(
            "/api/v1/websocket/admin/users/{user_id}/disconnect",
            delete(disconnect_user),
        )
}

fn parse_body(body: Result<Json<AdminMessageRequest>, JsonRejection>) -> AppResult<Message> {
    let Json(request) =
        body.map_err(|e| AppError::bad_request(format!("Invalid request body: {}", e.body_text())))?;
    request.into_message()
}

pub async fn broadcast_to_all(
    State(state): State<AppState>,
    body: Result<Json<AdminMessageRequest>, JsonRejection>,
) -> AppResult<Json<AdminResponse>> {
    let message = parse_body(body)?;
    let kind = message.payload.kind().to_string();

    state.hub.broadcast(message).await?;
    info!(kind = %kind, "Operator broadcast to all clients");

    Ok(Json(AdminResponse {
        message: "Message broadcasted to all clients",
        room_id: None,
        user_id: None,
        kind: Some(kind),
    }))
}

pub async fn broadcast_to_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    body: Result<Json<AdminMessageRequest>, JsonRejection>,
) -> AppResult<Json<AdminResponse>> {
    let room_id = RoomId::from(room_id);
    let message = parse_body(body)?.in_room(room_id.clone());
    let kind = message.payload.kind().to_string();

    state.hub.send_to_room(room_id.clone(), None, message).await?;
    info!(room_id = %room_id, kind = %kind, "Operator broadcast to room");

    Ok(Json(AdminResponse {
        message: "Message broadcasted to room",
        room_id: Some(room_id),
        user_id: None,
        kind: Some(kind),
    }))
}

pub async fn send_direct_message(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Result<Json<AdminMessageRequest>, JsonRejection>,
) -> AppResult<Json<AdminResponse>> {
    let user_id = UserId::from(user_id);
    let message = parse_body(body)?;
    let kind = message.payload.kind().to_string();

    if !state.hub.is_user_connected(user_id.clone()).await? {
        return Err(AppError::not_found(USER_OFFLINE));
    }
    state
        .hub
        .send_direct(Target::User(user_id.clone()), message)
        .await?;
    info!(user_id = %user_id, kind = %kind, "Operator message sent to user");

    Ok(Json(AdminResponse {
        message: "Message sent to user",
        room_id: None,
        user_id: Some(user_id),
        kind: Some(kind),
    }))
}

pub async fn disconnect_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<AdminResponse>> {
    let user_id = UserId::from(user_id);

    let closed = state.hub.disconnect_user(user_id.clone()).await?;
    if closed == 0 {
        return Err(AppError::not_found(USER_OFFLINE));
    }
    info!(user_id = %user_id, connections = closed, "Operator disconnected user");

    Ok(Json(AdminResponse {
        message: "User disconnected",
        room_id: None,
        user_id: Some(user_id),
        kind: None,
    }))
}
