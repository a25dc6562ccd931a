use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::chat::messages;
use crate::media::store as media_store;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting on the REST read surface: 2 req/s with a generous burst
    // per IP. Uses PeerIpKeyExtractor, which reads from ConnectInfo.
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(2)
            .burst_size(30)
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    // WebSocket endpoints. Principal and target travel in the path; the
    // handler resolves both before accepting the upgrade.
    let ws_routes = Router::new()
        .route(
            "/ws/rooms/{room_id}/{username}",
            axum::routing::get(ws_handler::ws_room),
        )
        .route(
            "/ws/chat/{username}/{peer}",
            axum::routing::get(ws_handler::ws_chat),
        );

    // Durable history read, rate limited
    let api_routes = Router::new()
        .route(
            "/api/rooms/{room_id}/messages",
            axum::routing::get(messages::get_room_history),
        )
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Stored media, so broadcast audio/file URLs resolve
    let media_routes = Router::new()
        .route("/media/audio/{name}", axum::routing::get(serve_audio))
        .route("/media/files/{name}", axum::routing::get(serve_file));

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(ws_routes)
        .merge(api_routes)
        .merge(media_routes)
        .merge(health)
        .with_state(state)
}

/// GET /media/audio/{name} — normalized voice messages, always WAV.
async fn serve_audio(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match media_store::load_media(&state.data_dir, "audio", &name) {
        Some(bytes) => ([(header::CONTENT_TYPE, "audio/wav")], bytes).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /media/files/{name} — stored file attachments.
async fn serve_file(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match media_store::load_media(&state.data_dir, "files", &name) {
        Some(bytes) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
