//! Inbound message processing pipeline.
//!
//! Each accepted frame becomes exactly one persisted message. The pipeline
//! order is fixed: validate → durable write → cache push → broadcast, so no
//! receiver can ever observe a broadcast for a message that is not yet
//! durably stored. Failures are message-scoped: the originating connection
//! gets an error frame and stays open; nothing is broadcast.

use crate::cache::CacheEntry;
use crate::chat::messages::{self, MessageContent, StoredMessage};
use crate::chat::rooms::ResolvedSession;
use crate::error::{RelayError, RelayResult};
use crate::media::{self, store as media_store};
use crate::state::AppState;
use crate::ws::protocol::{self, ChatEvent, InboundFrame, EVENT_CHAT_MESSAGE};
use crate::ws::ConnectionSender;

/// Handle one raw inbound text frame from a connection. Runs to completion
/// before the session reads its next frame, which is what makes two sends
/// from the same connection arrive at every member in order.
pub async fn process_inbound(
    state: &AppState,
    session: &ResolvedSession,
    tx: &ConnectionSender,
    raw: &str,
) {
    match handle_frame(state, session, raw).await {
        Ok(delivered) => {
            tracing::debug!(
                group_key = %session.group_key,
                sender = %session.principal.username,
                delivered = delivered,
                "Message relayed"
            );
        }
        Err(err) => {
            tracing::debug!(
                group_key = %session.group_key,
                sender = %session.principal.username,
                error = %err,
                "Inbound message dropped"
            );
            protocol::send_error(tx, &err.to_string());
        }
    }
}

async fn handle_frame(
    state: &AppState,
    session: &ResolvedSession,
    raw: &str,
) -> RelayResult<usize> {
    let frame: InboundFrame = serde_json::from_str(raw)
        .map_err(|e| RelayError::InvalidFrame(format!("not a message object: {e}")))?;

    let content = validate_frame(state, session, frame).await?;

    // Durable write first; a persistence failure means no cache entry and
    // no broadcast.
    let stored = messages::create_message(
        &state.db,
        &session.chatroom.id,
        &session.principal,
        content,
    )
    .await?;

    // Fast path second: best-effort recency list, only ever populated with
    // messages that made it into the system of record.
    state
        .cache
        .push(&session.group_key, cache_entry(&stored));

    // Fan-out last. Members joining after this point do not receive the
    // event; per-recipient failures are skipped inside the registry.
    let delivered = state
        .groups
        .broadcast(&session.group_key, &chat_event(&stored));

    Ok(delivered)
}

/// Enforce the one-populated-field rule and turn the frame into a content
/// variant, validating and storing media along the way. Media validation
/// and transcoding are CPU-bound, so they run on the blocking pool.
async fn validate_frame(
    state: &AppState,
    session: &ResolvedSession,
    frame: InboundFrame,
) -> RelayResult<MessageContent> {
    match frame.populated_fields() {
        0 => {
            return Err(RelayError::InvalidFrame(
                "message has no content".to_string(),
            ))
        }
        1 => {}
        n => {
            return Err(RelayError::InvalidFrame(format!(
                "message populates {n} content fields, expected exactly one"
            )))
        }
    }

    if let Some(text) = frame.content.filter(|s| !s.is_empty()) {
        return Ok(MessageContent::Text(text));
    }

    let sender = session.principal.username.clone();
    let data_dir = state.data_dir.clone();

    if let Some(payload) = frame.audio_content.filter(|s| !s.is_empty()) {
        let rel_path = tokio::task::spawn_blocking(move || {
            let audio = media::validate_audio(&payload)?;
            let rel_path = media_store::audio_rel_path(&sender);
            media_store::store_media(&data_dir, &rel_path, &audio.wav_bytes)?;
            Ok::<_, RelayError>(rel_path)
        })
        .await
        .map_err(|e| RelayError::Persistence(format!("join: {e}")))??;
        return Ok(MessageContent::AudioRef(rel_path));
    }

    // populated_fields() == 1 leaves only the file slot.
    let payload = frame
        .file_content
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RelayError::InvalidFrame("message has no content".to_string()))?;
    let rel_path = tokio::task::spawn_blocking(move || {
        let file = media::validate_file(&payload)?;
        let rel_path = media_store::file_rel_path(&sender, &file.extension);
        media_store::store_media(&data_dir, &rel_path, &file.bytes)?;
        Ok::<_, RelayError>(rel_path)
    })
    .await
    .map_err(|e| RelayError::Persistence(format!("join: {e}")))??;
    Ok(MessageContent::FileRef(rel_path))
}

fn cache_entry(stored: &StoredMessage) -> CacheEntry {
    CacheEntry {
        sender: stored.sender.username.clone(),
        text: stored.text_content.clone(),
        audio_ref: stored.audio_path.as_deref().map(media_store::media_url),
        file_ref: stored.file_path.as_deref().map(media_store::media_url),
        sent_at: stored.date_sent.clone(),
    }
}

fn chat_event(stored: &StoredMessage) -> ChatEvent {
    ChatEvent {
        event_type: EVENT_CHAT_MESSAGE.to_string(),
        message: stored.text_content.clone(),
        sender: stored.sender.username.clone(),
        date_sent: stored.date_sent.clone(),
        audio_url: stored.audio_path.as_deref().map(media_store::media_url),
        file_url: stored.file_path.as_deref().map(media_store::media_url),
    }
}
