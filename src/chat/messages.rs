//! Durable message persistence and the room history read path.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::error::{RelayError, RelayResult};
use crate::identity::Principal;
use crate::media::store as media_store;
use crate::state::AppState;

/// Default page size for message history.
const DEFAULT_LIMIT: u32 = 50;
/// Maximum page size for message history.
const MAX_LIMIT: u32 = 200;

/// The single populated content slot of a message. Media variants carry
/// post-validation storage references, never raw bytes.
#[derive(Debug, Clone)]
pub enum MessageContent {
    Text(String),
    AudioRef(String),
    FileRef(String),
}

/// A message as written to the system of record.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub chatroom_id: String,
    pub sender: Principal,
    pub text_content: Option<String>,
    pub audio_path: Option<String>,
    pub file_path: Option<String>,
    pub date_sent: String,
}

/// Persist one message, assigning `date_sent` at the moment of the durable
/// write. Writes are serialized on the shared connection, so timestamps are
/// monotonically non-decreasing per room. Messages are never updated or
/// deleted here. Runs on the blocking pool and completes even if the
/// originating connection goes away mid-flight.
pub async fn create_message(
    db: &DbPool,
    chatroom_id: &str,
    sender: &Principal,
    content: MessageContent,
) -> RelayResult<StoredMessage> {
    let db = db.clone();
    let chatroom_id = chatroom_id.to_string();
    let sender = sender.clone();

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| RelayError::Persistence(format!("DB lock: {e}")))?;

        let (text_content, audio_path, file_path) = match content {
            MessageContent::Text(text) => (Some(text), None, None),
            MessageContent::AudioRef(path) => (None, Some(path), None),
            MessageContent::FileRef(path) => (None, None, Some(path)),
        };

        let id = uuid::Uuid::now_v7().to_string();
        let date_sent = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO messages (id, chatroom_id, sender_id, text_content, audio_path, file_path, date_sent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                id,
                chatroom_id,
                sender.id,
                text_content,
                audio_path,
                file_path,
                date_sent,
            ],
        )?;

        Ok(StoredMessage {
            id,
            chatroom_id,
            sender,
            text_content,
            audio_path,
            file_path,
            date_sent,
        })
    })
    .await
    .map_err(|e| RelayError::Persistence(format!("join: {e}")))?
}

// --- History read path ---

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    pub sender: String,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    pub date_sent: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<HistoryMessage>,
}

/// GET /api/rooms/{room_id}/messages?limit={n}
/// The newest `limit` messages of a room, returned oldest-first with media
/// references rendered as resolvable URLs.
pub async fn get_room_history(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, (StatusCode, String)> {
    let db = state.db.clone();
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    let result = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB lock: {e}")))?;

        let room_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM chatrooms WHERE id = ?1",
                rusqlite::params![room_id],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .unwrap_or(false);
        if !room_exists {
            return Err((StatusCode::NOT_FOUND, format!("unknown room: {room_id}")));
        }

        let mut stmt = conn
            .prepare(
                "SELECT m.id, u.username, m.text_content, m.audio_path, m.file_path, m.date_sent
                 FROM messages m
                 JOIN users u ON u.id = m.sender_id
                 WHERE m.chatroom_id = ?1
                 ORDER BY m.date_sent DESC, m.id DESC
                 LIMIT ?2",
            )
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

        let mut messages: Vec<HistoryMessage> = stmt
            .query_map(rusqlite::params![room_id, limit as i64], |row| {
                let audio_path: Option<String> = row.get(3)?;
                let file_path: Option<String> = row.get(4)?;
                Ok(HistoryMessage {
                    id: row.get(0)?,
                    sender: row.get(1)?,
                    message: row.get(2)?,
                    audio_url: audio_path.as_deref().map(media_store::media_url),
                    file_url: file_path.as_deref().map(media_store::media_url),
                    date_sent: row.get(5)?,
                })
            })
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
            .filter_map(|r| r.ok())
            .collect();

        // Fetched newest-first for the LIMIT; present oldest-first.
        messages.reverse();

        Ok(HistoryResponse { messages })
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("join: {e}")))??;

    Ok(Json(result))
}
