//! WebSocket join and presence endpoints.
//!
//! Handles the HTTP → WebSocket upgrade and the checks in front of it:
//! 1. Authenticate (via the auth middleware and `RequireAuth`)
//! 2. Resolve the room and check hall / private-room membership
//! 3. Upgrade, register with the hub, and serve until either side ends

use std::sync::Arc;

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;

use crate::adapters::http::middleware::RequireAuth;
use crate::domain::chat::RoomRecord;
use crate::domain::foundation::{AuthenticatedUser, RoomId, UserId};
use crate::ports::RoomDirectory;

use super::client::{serve, Client};
use super::hub::Hub;

/// State required by the WebSocket routes.
#[derive(Clone)]
pub struct WebSocketState {
    pub hub: Arc<Hub>,
    pub directory: Arc<dyn RoomDirectory>,
}

impl WebSocketState {
    pub fn new(hub: Arc<Hub>, directory: Arc<dyn RoomDirectory>) -> Self {
        Self { hub, directory }
    }
}

/// Why a join (or presence query) was refused before any upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("Invalid room ID")]
    InvalidRoomId,

    #[error("Room not found")]
    RoomNotFound,

    #[error("You are not a member of this hall")]
    NotHallMember,

    #[error("You are not a member of this room")]
    NotRoomMember,

    #[error("Chat is temporarily unavailable")]
    HubUnavailable,

    #[error("Internal server error")]
    Internal,
}

impl JoinError {
    pub fn status(&self) -> StatusCode {
        match self {
            JoinError::InvalidRoomId => StatusCode::BAD_REQUEST,
            JoinError::RoomNotFound => StatusCode::NOT_FOUND,
            JoinError::NotHallMember | JoinError::NotRoomMember => StatusCode::FORBIDDEN,
            JoinError::HubUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            JoinError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            JoinError::InvalidRoomId => "INVALID_ROOM_ID",
            JoinError::RoomNotFound => "ROOM_NOT_FOUND",
            JoinError::NotHallMember => "NOT_HALL_MEMBER",
            JoinError::NotRoomMember => "NOT_ROOM_MEMBER",
            JoinError::HubUnavailable => "HUB_UNAVAILABLE",
            JoinError::Internal => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for JoinError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({
                "code": self.code(),
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

/// Decide whether `user` may join the room named in the path.
///
/// Public rooms need hall membership. Private rooms additionally need direct
/// room membership.
pub async fn authorize_join(
    state: &WebSocketState,
    user: &AuthenticatedUser,
    raw_room_id: &str,
) -> Result<RoomRecord, JoinError> {
    let room_id: RoomId = raw_room_id.parse().map_err(|_| JoinError::InvalidRoomId)?;

    let room = state
        .directory
        .find_room(&room_id)
        .await
        .map_err(|e| {
            tracing::error!(room_id = %room_id, "Room lookup failed: {}", e);
            JoinError::Internal
        })?
        .ok_or(JoinError::RoomNotFound)?;

    let in_hall = state
        .directory
        .is_hall_member(&room.hall_id, &user.id)
        .await
        .map_err(|e| {
            tracing::error!(hall_id = %room.hall_id, user_id = %user.id, "Hall membership check failed: {}", e);
            JoinError::Internal
        })?;
    if !in_hall {
        return Err(JoinError::NotHallMember);
    }

    if room.is_private {
        let in_room = state
            .directory
            .is_room_member(&room.id, &user.id)
            .await
            .map_err(|e| {
                tracing::error!(room_id = %room.id, user_id = %user.id, "Room membership check failed: {}", e);
                JoinError::Internal
            })?;
        if !in_room {
            return Err(JoinError::NotRoomMember);
        }
    }

    if state.hub.is_closed() {
        return Err(JoinError::HubUnavailable);
    }

    Ok(room)
}

/// Join a room over WebSocket.
///
/// Route: `GET /ws/rooms/:room_id`
pub async fn join_room(
    RequireAuth(user): RequireAuth,
    State(state): State<WebSocketState>,
    Path(room_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, JoinError> {
    let room = authorize_join(&state, &user, &room_id).await?;
    let hub = state.hub.clone();
    let max_message_bytes = hub.config().max_message_bytes;

    Ok(ws
        .max_message_size(max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, hub, user, room)))
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, user: AuthenticatedUser, room: RoomRecord) {
    let (client, mailbox) = Client::new(
        user.id,
        user.username.clone(),
        room.id,
        room.is_private,
        hub.config().mailbox_capacity,
    );

    if let Err(e) = hub.register(client.clone()).await {
        tracing::debug!(user_id = %user.id, room_id = %room.id, "Register refused: {}", e);
        return;
    }

    tracing::info!(
        client_id = %client.id(),
        user_id = %user.id,
        username = %user.username,
        room_id = %room.id,
        "WebSocket connected"
    );

    let timing = hub.timing();
    serve(hub, client, mailbox, socket, timing).await;
}

/// One connected user, as listed by the presence endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnlineUser {
    pub id: UserId,
    pub username: String,
}

/// List users currently connected to a room.
///
/// Route: `GET /ws/rooms/:room_id/clients`
pub async fn room_clients(
    RequireAuth(user): RequireAuth,
    State(state): State<WebSocketState>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<OnlineUser>>, JoinError> {
    let room = authorize_join(&state, &user, &room_id).await?;

    let users = state
        .hub
        .online_members(&room.id)
        .await
        .into_iter()
        .map(|(id, username)| OnlineUser { id, username })
        .collect();

    Ok(Json(users))
}

/// Create axum router for the WebSocket endpoints.
///
/// The auth middleware must be layered on by the caller.
pub fn websocket_router() -> Router<WebSocketState> {
    Router::new()
        .route("/ws/rooms/:room_id", get(join_room))
        .route("/ws/rooms/:room_id/clients", get(room_clients))
}
