//! WebSocket upgrade endpoints.
//!
//! Resolution happens before acceptance: the principal is looked up and the
//! room resolved while the request is still plain HTTP, so a failed
//! connection is rejected with a status code and never performs any group
//! registration.

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::Response,
};

use crate::chat::rooms::{self, RoomTarget};
use crate::error::RelayError;
use crate::state::AppState;
use crate::ws::actor;

/// GET /ws/rooms/{room_id}/{username}
/// Explicit-room form: the room must exist and include the principal.
pub async fn ws_room(
    State(state): State<AppState>,
    Path((room_id, username)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Result<Response, (StatusCode, String)> {
    let session = rooms::resolve(&state.db, &username, RoomTarget::Explicit(room_id))
        .await
        .map_err(reject)?;

    tracing::info!(
        username = %session.principal.username,
        group_key = %session.group_key,
        "WebSocket connection resolved (explicit room)"
    );
    Ok(ws.on_upgrade(move |socket| actor::run_connection(socket, state, session)))
}

/// GET /ws/chat/{username}/{peer}
/// Implicit two-party form: find-or-create the pairwise room.
pub async fn ws_chat(
    State(state): State<AppState>,
    Path((username, peer)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Result<Response, (StatusCode, String)> {
    let session = rooms::resolve(&state.db, &username, RoomTarget::Peer(peer))
        .await
        .map_err(reject)?;

    tracing::info!(
        username = %session.principal.username,
        group_key = %session.group_key,
        "WebSocket connection resolved (peer hint)"
    );
    Ok(ws.on_upgrade(move |socket| actor::run_connection(socket, state, session)))
}

/// Map resolution failures to HTTP rejections.
fn reject(err: RelayError) -> (StatusCode, String) {
    let status = match err {
        RelayError::AuthRequired(_) => StatusCode::UNAUTHORIZED,
        RelayError::RoomResolution(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!(status = %status, error = %err, "WebSocket connection rejected");
    (status, err.to_string())
}
