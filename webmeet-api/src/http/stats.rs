//! Read-only views of the hub registry and the media relay coordinator

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use webmeet_core::{RoomId, UserId};
use webmeet_sfu::{RoomStats, SignalingCoordinator, SignalingStats, UserStats};

use crate::http::{AppError, AppResult, AppState};

#[derive(Debug, Serialize)]
pub struct HubStatsResponse {
    pub connected_clients: usize,
    pub active_rooms: usize,
    pub server_status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUsersResponse {
    pub room_id: RoomId,
    pub users: Vec<UserId>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRoomsResponse {
    pub user_id: UserId,
    pub rooms: Vec<RoomId>,
    pub count: usize,
}

pub fn create_stats_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/websocket/stats", get(hub_stats))
        .route("/api/v1/websocket/rooms/{room_id}/users", get(room_users))
        .route("/api/v1/websocket/users/{user_id}/rooms", get(user_rooms))
        .route("/api/v1/signaling/stats", get(signaling_stats))
        .route("/api/v1/signaling/rooms/{room_id}", get(signaling_room_stats))
        .route("/api/v1/signaling/users/{user_id}", get(signaling_user_stats))
}

pub async fn hub_stats(State(state): State<AppState>) -> AppResult<Json<HubStatsResponse>> {
    let connected_clients = state.hub.peer_count().await?;
    let active_rooms = state.hub.room_count().await?;

    Ok(Json(HubStatsResponse {
        connected_clients,
        active_rooms,
        server_status: "running",
    }))
}

pub async fn room_users(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<Json<RoomUsersResponse>> {
    let room_id = RoomId::from(room_id);
    let users = state.hub.room_users(room_id.clone()).await?;

    Ok(Json(RoomUsersResponse {
        count: users.len(),
        room_id,
        users,
    }))
}

pub async fn user_rooms(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<UserRoomsResponse>> {
    let user_id = UserId::from(user_id);
    let rooms = state.hub.user_rooms(user_id.clone()).await?;

    Ok(Json(UserRoomsResponse {
        count: rooms.len(),
        user_id,
        rooms,
    }))
}

fn coordinator(state: &AppState) -> AppResult<&Arc<SignalingCoordinator>> {
    state
        .coordinator
        .as_ref()
        .ok_or_else(|| AppError::service_unavailable("Media relay is disabled"))
}

pub async fn signaling_stats(State(state): State<AppState>) -> AppResult<Json<SignalingStats>> {
    Ok(Json(coordinator(&state)?.all_stats().await))
}

pub async fn signaling_room_stats(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<Json<RoomStats>> {
    let room_id = RoomId::from(room_id);
    Ok(Json(coordinator(&state)?.room_stats(&room_id).await))
}

pub async fn signaling_user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<UserStats>> {
    let user_id = UserId::from(user_id);
    Ok(Json(coordinator(&state)?.user_stats(&user_id).await))
}
