//! Principal resolution.
//!
//! Authentication and session establishment live upstream; the relay only
//! receives a principal identifier on the connection route and resolves it
//! to a typed `Principal` here. Principals are looked up, never created, by
//! the relay path — `create_principal` exists for provisioning and tests.

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{RelayError, RelayResult};

/// An authenticated user identity: immutable external reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub username: String,
}

/// Resolve a username to a Principal on an already-held connection.
/// Runs inside the caller's spawn_blocking critical section.
pub fn lookup_principal_on(conn: &Connection, username: &str) -> RelayResult<Principal> {
    conn.query_row(
        "SELECT id, username FROM users WHERE username = ?1",
        rusqlite::params![username],
        |row| {
            Ok(Principal {
                id: row.get(0)?,
                username: row.get(1)?,
            })
        },
    )
    .map_err(|_| RelayError::AuthRequired(username.to_string()))
}

/// Insert a user row and return the Principal.
/// Provisioning entry point for the external identity collaborator; also
/// used by the integration tests to seed users.
pub fn create_principal(db: &DbPool, username: &str) -> RelayResult<Principal> {
    let conn = db
        .lock()
        .map_err(|e| RelayError::Persistence(format!("DB lock: {e}")))?;
    let id = Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO users (id, username) VALUES (?1, ?2)",
        rusqlite::params![id, username],
    )?;
    Ok(Principal {
        id,
        username: username.to_string(),
    })
}
