use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking — no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: principals and conversations

-- Principals are provisioned by the external identity service; the relay
-- only reads this table.
CREATE TABLE users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Pairwise conversations. Participant order is canonicalized
-- (lexicographically smaller username is participant_a) and the UNIQUE
-- constraint enforces at most one room per unordered pair at the storage
-- layer, backing up the resolver's critical section.
CREATE TABLE chatrooms (
    id TEXT PRIMARY KEY,
    participant_a TEXT NOT NULL,
    participant_b TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(participant_a, participant_b),
    FOREIGN KEY (participant_a) REFERENCES users(username),
    FOREIGN KEY (participant_b) REFERENCES users(username)
);
CREATE INDEX idx_chatrooms_a ON chatrooms(participant_a);
CREATE INDEX idx_chatrooms_b ON chatrooms(participant_b);
",
        ),
        M::up(
            "-- Migration 2: messages

-- Exactly one content slot is populated per message; the CHECK guarantees
-- at least one at the storage layer. audio_path/file_path hold
-- post-validation media references, never raw bytes. Messages are
-- append-only: the relay never updates or deletes rows here.
CREATE TABLE messages (
    id TEXT PRIMARY KEY,
    chatroom_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    text_content TEXT,
    audio_path TEXT,
    file_path TEXT,
    date_sent TEXT NOT NULL,
    CHECK (text_content IS NOT NULL OR audio_path IS NOT NULL OR file_path IS NOT NULL),
    FOREIGN KEY (chatroom_id) REFERENCES chatrooms(id) ON DELETE CASCADE,
    FOREIGN KEY (sender_id) REFERENCES users(id)
);
CREATE INDEX idx_messages_room_sent ON messages(chatroom_id, date_sent);
",
        ),
    ])
}
