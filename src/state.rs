use crate::cache::RecentCache;
use crate::db::DbPool;
use crate::ws::GroupRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex> — the system of record
    pub db: DbPool,
    /// Live WebSocket connections per group key
    pub groups: GroupRegistry,
    /// Ephemeral most-recent-first message cache per group key
    pub cache: RecentCache,
    /// Data directory holding the database and stored media
    pub data_dir: String,
}
