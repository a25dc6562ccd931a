/// Database row types shared across modules.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.
/// (User rows surface as `identity::Principal`; message rows as
/// `chat::messages::StoredMessage`.)

/// Pairwise conversation record.
/// participant_a is the lexicographically smaller username; the pair is
/// immutable after creation.
#[derive(Debug, Clone)]
pub struct ChatroomRow {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub created_at: String,
}
