//! Actor-per-connection session loop.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use uuid::Uuid;

use crate::chat::relay;
use crate::chat::rooms::ResolvedSession;
use crate::state::AppState;

/// Ping interval: server sends a WebSocket ping every 30 seconds so stale
/// connections cannot linger in the group registry.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if no pong arrives within 10 seconds after a ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for a resolved session.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader loop: processes inbound frames, one to completion at a time
///
/// The mpsc channel is what the group registry holds: any broadcast to this
/// session's group enqueues on it. Each inbound frame is relayed fully
/// (validate → persist → cache → broadcast) before the next frame on this
/// connection is read; other connections proceed in parallel.
pub async fn run_connection(socket: WebSocket, state: AppState, session: ResolvedSession) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();
    let conn_id = Uuid::now_v7();

    // Register this connection under its resolved group key.
    state.groups.join(&session.group_key, conn_id, tx.clone());

    tracing::info!(
        username = %session.principal.username,
        group_key = %session.group_key,
        conn_id = %conn_id,
        "WebSocket actor started"
    );

    // Writer task: forwards mpsc messages to the WebSocket sink.
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Ping task: periodic pings, close on pong timeout.
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: each Text frame is an inbound message for the relay
    // pipeline. The await here is the per-connection serialization point.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    relay::process_inbound(&state, &session, &tx, text.as_str()).await;
                }
                Message::Binary(_) => {
                    // The relay speaks JSON text frames; binary is ignored.
                    tracing::debug!(
                        username = %session.principal.username,
                        "Received binary frame (expected JSON text)"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        username = %session.principal.username,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    username = %session.principal.username,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(
                    username = %session.principal.username,
                    "WebSocket stream ended"
                );
                break;
            }
        }
    }

    // Cleanup: stop the writer and ping tasks, then deregister. leave() is
    // idempotent, so a session that never fully registered is still safe.
    writer_handle.abort();
    ping_handle.abort();
    state.groups.leave(&session.group_key, conn_id);

    tracing::info!(
        username = %session.principal.username,
        group_key = %session.group_key,
        conn_id = %conn_id,
        "WebSocket actor stopped"
    );
}

/// Writer task: receives messages from the mpsc channel and forwards them
/// to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}
