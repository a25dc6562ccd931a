//! Integration tests for chatroom resolution invariants and the durable
//! history read path.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use parley_server::chat::rooms::{resolve, RoomTarget};

async fn start_test_server() -> (SocketAddr, parley_server::db::DbPool) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = parley_server::db::init_db(&data_dir).expect("Failed to init DB");

    let state = parley_server::state::AppState {
        db: db.clone(),
        groups: parley_server::ws::GroupRegistry::new(),
        cache: parley_server::cache::RecentCache::default(),
        data_dir,
    };

    let app = parley_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    (addr, db)
}

fn seed_user(db: &parley_server::db::DbPool, username: &str) {
    parley_server::identity::create_principal(db, username).expect("Failed to seed user");
}

fn chatroom_count(db: &parley_server::db::DbPool) -> i64 {
    let conn = db.lock().unwrap();
    conn.query_row("SELECT COUNT(*) FROM chatrooms", [], |row| row.get(0))
        .unwrap()
}

#[tokio::test]
async fn concurrent_pair_resolution_creates_exactly_one_room() {
    let (_addr, db) = start_test_server().await;
    seed_user(&db, "alice");
    seed_user(&db, "bob");

    // Both sides resolve the same unordered pair at the same time.
    let db_a = db.clone();
    let db_b = db.clone();
    let (from_alice, from_bob) = tokio::join!(
        tokio::spawn(async move {
            resolve(&db_a, "alice", RoomTarget::Peer("bob".to_string())).await
        }),
        tokio::spawn(async move {
            resolve(&db_b, "bob", RoomTarget::Peer("alice".to_string())).await
        }),
    );

    let from_alice = from_alice.unwrap().unwrap();
    let from_bob = from_bob.unwrap().unwrap();

    assert_eq!(from_alice.chatroom.id, from_bob.chatroom.id);
    assert_eq!(from_alice.group_key, from_bob.group_key);
    assert_eq!(chatroom_count(&db), 1);
}

#[tokio::test]
async fn repeated_resolution_reuses_the_room() {
    let (_addr, db) = start_test_server().await;
    seed_user(&db, "alice");
    seed_user(&db, "bob");

    let first = resolve(&db, "alice", RoomTarget::Peer("bob".to_string()))
        .await
        .unwrap();
    for _ in 0..5 {
        let again = resolve(&db, "bob", RoomTarget::Peer("alice".to_string()))
            .await
            .unwrap();
        assert_eq!(again.chatroom.id, first.chatroom.id);
    }
    assert_eq!(chatroom_count(&db), 1);
}

#[tokio::test]
async fn history_round_trips_a_sent_message_exactly_once() {
    let (addr, db) = start_test_server().await;
    seed_user(&db, "alice");
    seed_user(&db, "bob");

    let room_id = resolve(&db, "alice", RoomTarget::Peer("bob".to_string()))
        .await
        .unwrap()
        .chatroom
        .id;

    // Send one text message over the real WebSocket path.
    let url = format!("ws://{addr}/ws/chat/alice/bob");
    let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let (mut write, mut read) = stream.split();
    write
        .send(Message::Text(
            json!({"content": "round trip"}).to_string().into(),
        ))
        .await
        .unwrap();

    // Wait for the echo so persistence is known to have completed.
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .expect("Timed out")
            .unwrap()
            .unwrap();
        if let Message::Text(_) = msg {
            break;
        }
    }

    let resp = reqwest::get(format!("http://{addr}/api/rooms/{room_id}/messages"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let messages = body["messages"].as_array().unwrap();

    let matches: Vec<_> = messages
        .iter()
        .filter(|m| m["message"] == "round trip")
        .collect();
    assert_eq!(matches.len(), 1, "message must appear exactly once");
    assert_eq!(matches[0]["sender"], "alice");
    chrono::DateTime::parse_from_rfc3339(matches[0]["date_sent"].as_str().unwrap())
        .expect("date_sent must be ISO-8601");
}

#[tokio::test]
async fn history_for_unknown_room_is_404() {
    let (addr, _db) = start_test_server().await;

    let resp = reqwest::get(format!("http://{addr}/api/rooms/does-not-exist/messages"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn history_preserves_per_room_send_order() {
    let (addr, db) = start_test_server().await;
    seed_user(&db, "alice");
    seed_user(&db, "bob");

    let room_id = resolve(&db, "alice", RoomTarget::Peer("bob".to_string()))
        .await
        .unwrap()
        .chatroom
        .id;

    let url = format!("ws://{addr}/ws/chat/alice/bob");
    let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let (mut write, mut read) = stream.split();

    for i in 0..4 {
        write
            .send(Message::Text(
                json!({"content": format!("n{i}")}).to_string().into(),
            ))
            .await
            .unwrap();
    }
    // Drain the four echoes so all writes are durable.
    let mut seen = 0;
    while seen < 4 {
        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .expect("Timed out")
            .unwrap()
            .unwrap();
        if let Message::Text(_) = msg {
            seen += 1;
        }
    }

    let resp = reqwest::get(format!("http://{addr}/api/rooms/{room_id}/messages"))
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    let texts: Vec<String> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["message"].as_str().unwrap().to_string())
        .collect();

    assert_eq!(texts, vec!["n0", "n1", "n2", "n3"], "oldest-first history");
}
