//! Chatroom resolution and group-key derivation.
//!
//! A connection names its conversation either by explicit room id or by a
//! peer hint (implicit two-party chat). Both forms resolve to a chatroom
//! row before the connection is accepted; the group key is derived from the
//! resolved room id, so both participants of a pair always land on the same
//! key.

use rusqlite::Connection;

use crate::db::models::ChatroomRow;
use crate::db::DbPool;
use crate::error::{RelayError, RelayResult};
use crate::identity::{self, Principal};

/// Conversation target carried by the connection route.
#[derive(Debug, Clone)]
pub enum RoomTarget {
    /// Explicit room id: must exist and include the principal.
    Explicit(String),
    /// Peer username: canonicalize the pair and find-or-create the room.
    Peer(String),
}

/// Everything a connection session needs after successful resolution.
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub principal: Principal,
    pub chatroom: ChatroomRow,
    pub group_key: String,
}

/// Group key derivation: a pure function of the resolved chatroom identity.
pub fn group_key_for(chatroom_id: &str) -> String {
    format!("room:{chatroom_id}")
}

/// Resolve a principal + target to a chatroom, failing before any
/// registration can happen. Runs on the blocking pool; the whole
/// find-or-create executes inside one lock scope on the shared connection,
/// which is the per-pair critical section concurrent resolution requires.
pub async fn resolve(db: &DbPool, username: &str, target: RoomTarget) -> RelayResult<ResolvedSession> {
    let db = db.clone();
    let username = username.to_string();

    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| RelayError::Persistence(format!("DB lock: {e}")))?;

        let principal = identity::lookup_principal_on(&conn, &username)?;

        let chatroom = match target {
            RoomTarget::Explicit(room_id) => lookup_room(&conn, &principal, &room_id)?,
            RoomTarget::Peer(peer) => find_or_create_pair(&conn, &principal, &peer)?,
        };

        let group_key = group_key_for(&chatroom.id);
        Ok(ResolvedSession {
            principal,
            chatroom,
            group_key,
        })
    })
    .await
    .map_err(|e| RelayError::Persistence(format!("join: {e}")))?
}

/// Explicit form: the room must exist and the principal must be a
/// participant. Membership is read-only for the relay.
fn lookup_room(conn: &Connection, principal: &Principal, room_id: &str) -> RelayResult<ChatroomRow> {
    let room = conn
        .query_row(
            "SELECT id, participant_a, participant_b, created_at FROM chatrooms WHERE id = ?1",
            rusqlite::params![room_id],
            row_to_chatroom,
        )
        .map_err(|_| RelayError::RoomResolution(format!("unknown room: {room_id}")))?;

    if room.participant_a != principal.username && room.participant_b != principal.username {
        return Err(RelayError::RoomResolution(format!(
            "{} is not a participant of room {room_id}",
            principal.username
        )));
    }
    Ok(room)
}

/// Implicit form: canonicalize the unordered pair (lexicographically
/// smaller username becomes participant_a) and find-or-create. The lookup
/// checks both orderings of an existing row before creating a new one; the
/// UNIQUE(participant_a, participant_b) constraint backs the insert at the
/// storage layer.
fn find_or_create_pair(
    conn: &Connection,
    principal: &Principal,
    peer: &str,
) -> RelayResult<ChatroomRow> {
    if peer == principal.username {
        return Err(RelayError::RoomResolution(
            "cannot open a chat with yourself".to_string(),
        ));
    }

    // The peer must exist; a missing participant rejects the connection.
    identity::lookup_principal_on(conn, peer)
        .map_err(|_| RelayError::RoomResolution(format!("unknown peer: {peer}")))?;

    let (a, b) = if principal.username.as_str() < peer {
        (principal.username.as_str(), peer)
    } else {
        (peer, principal.username.as_str())
    };

    if let Some(existing) = select_pair(conn, a, b)? {
        return Ok(existing);
    }

    let id = uuid::Uuid::now_v7().to_string();
    // OR IGNORE: if another resolution won a race despite the lock scope,
    // the re-read below returns its row.
    conn.execute(
        "INSERT OR IGNORE INTO chatrooms (id, participant_a, participant_b) VALUES (?1, ?2, ?3)",
        rusqlite::params![id, a, b],
    )?;

    select_pair(conn, a, b)?.ok_or_else(|| {
        RelayError::Persistence(format!("chatroom for {a}/{b} missing after insert"))
    })
}

fn select_pair(conn: &Connection, a: &str, b: &str) -> RelayResult<Option<ChatroomRow>> {
    let found = conn
        .query_row(
            "SELECT id, participant_a, participant_b, created_at FROM chatrooms
             WHERE (participant_a = ?1 AND participant_b = ?2)
                OR (participant_a = ?2 AND participant_b = ?1)",
            rusqlite::params![a, b],
            row_to_chatroom,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    Ok(found)
}

fn row_to_chatroom(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatroomRow> {
    Ok(ChatroomRow {
        id: row.get(0)?,
        participant_a: row.get(1)?,
        participant_b: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::identity::create_principal;
    use std::sync::{Arc, Mutex};

    fn test_db() -> DbPool {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        db::migrations::migrations().to_latest(&mut conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    #[tokio::test]
    async fn peer_resolution_is_symmetric() {
        let db = test_db();
        create_principal(&db, "alice").unwrap();
        create_principal(&db, "bob").unwrap();

        let from_alice = resolve(&db, "alice", RoomTarget::Peer("bob".to_string()))
            .await
            .unwrap();
        let from_bob = resolve(&db, "bob", RoomTarget::Peer("alice".to_string()))
            .await
            .unwrap();

        assert_eq!(from_alice.chatroom.id, from_bob.chatroom.id);
        assert_eq!(from_alice.group_key, from_bob.group_key);
        assert_eq!(from_alice.chatroom.participant_a, "alice");
        assert_eq!(from_alice.chatroom.participant_b, "bob");
    }

    #[tokio::test]
    async fn explicit_room_requires_membership() {
        let db = test_db();
        create_principal(&db, "alice").unwrap();
        create_principal(&db, "bob").unwrap();
        create_principal(&db, "mallory").unwrap();

        let room = resolve(&db, "alice", RoomTarget::Peer("bob".to_string()))
            .await
            .unwrap()
            .chatroom;

        let ok = resolve(&db, "bob", RoomTarget::Explicit(room.id.clone())).await;
        assert!(ok.is_ok());

        let denied = resolve(&db, "mallory", RoomTarget::Explicit(room.id)).await;
        assert!(matches!(denied, Err(RelayError::RoomResolution(_))));
    }

    #[tokio::test]
    async fn unknown_room_and_peer_fail_resolution() {
        let db = test_db();
        create_principal(&db, "alice").unwrap();

        let missing_room = resolve(&db, "alice", RoomTarget::Explicit("nope".to_string())).await;
        assert!(matches!(missing_room, Err(RelayError::RoomResolution(_))));

        let missing_peer = resolve(&db, "alice", RoomTarget::Peer("ghost".to_string())).await;
        assert!(matches!(missing_peer, Err(RelayError::RoomResolution(_))));
    }

    #[tokio::test]
    async fn unknown_principal_is_auth_required() {
        let db = test_db();
        let err = resolve(&db, "nobody", RoomTarget::Peer("bob".to_string())).await;
        assert!(matches!(err, Err(RelayError::AuthRequired(_))));
    }

    #[tokio::test]
    async fn self_chat_is_rejected() {
        let db = test_db();
        create_principal(&db, "alice").unwrap();

        let err = resolve(&db, "alice", RoomTarget::Peer("alice".to_string())).await;
        assert!(matches!(err, Err(RelayError::RoomResolution(_))));
    }
}
