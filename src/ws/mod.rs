pub mod actor;
pub mod handler;
pub mod protocol;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ws::protocol::ChatEvent;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific
/// client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// One live connection registered in a group.
#[derive(Clone)]
struct GroupMember {
    conn_id: Uuid,
    tx: ConnectionSender,
}

/// Group registry & broadcaster: tracks which live connections belong to
/// which group key and fans events out to all of them.
///
/// Backed by a DashMap so join/leave/broadcast contend only on the target
/// group's shard, never a global lock. Membership is process-lifetime only
/// and never persisted. The registry exposes join/leave/broadcast — callers
/// never iterate members directly.
#[derive(Clone, Default)]
pub struct GroupRegistry {
    groups: Arc<DashMap<String, Vec<GroupMember>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under a group key.
    pub fn join(&self, group_key: &str, conn_id: Uuid, tx: ConnectionSender) {
        self.groups
            .entry(group_key.to_string())
            .or_default()
            .push(GroupMember { conn_id, tx });

        tracing::debug!(
            group_key = %group_key,
            conn_id = %conn_id,
            members = self.member_count(group_key),
            "Connection joined group"
        );
    }

    /// Remove a connection from a group. Idempotent: an unknown group key or
    /// an already-removed connection is a no-op, not an error.
    pub fn leave(&self, group_key: &str, conn_id: Uuid) {
        let mut remove_group = false;

        if let Some(mut members) = self.groups.get_mut(group_key) {
            members.retain(|m| m.conn_id != conn_id);
            if members.is_empty() {
                remove_group = true;
            }
        }

        if remove_group {
            self.groups.remove(group_key);
        }

        tracing::debug!(
            group_key = %group_key,
            conn_id = %conn_id,
            "Connection left group"
        );
    }

    /// Deliver an event to every connection joined to the group at the
    /// moment of the call, the sending session included (echo confirms
    /// receipt). The event is serialized once; a send failure to one
    /// recipient is logged and skipped, never aborting the rest of the
    /// fan-out. Returns the number of successful deliveries.
    pub fn broadcast(&self, group_key: &str, event: &ChatEvent) -> usize {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(group_key = %group_key, error = %e, "Event serialization failed");
                return 0;
            }
        };
        let msg = axum::extract::ws::Message::Text(text.into());

        let mut delivered = 0;
        if let Some(members) = self.groups.get(group_key) {
            for member in members.iter() {
                match member.tx.send(msg.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => {
                        // Receiver already gone (connection closing) — skip.
                        tracing::debug!(
                            group_key = %group_key,
                            conn_id = %member.conn_id,
                            "Skipped delivery to closed connection"
                        );
                    }
                }
            }
        }
        delivered
    }

    /// Current member count for a group key.
    pub fn member_count(&self, group_key: &str) -> usize {
        self.groups.get(group_key).map(|m| m.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::ChatEvent;
    use axum::extract::ws::Message;

    fn event(text: &str) -> ChatEvent {
        ChatEvent::text("alice", text, "2026-01-01T00:00:00+00:00")
    }

    fn member() -> (Uuid, ConnectionSender, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Uuid::now_v7(), tx, rx)
    }

    #[test]
    fn broadcast_reaches_all_members_including_sender() {
        let registry = GroupRegistry::new();
        let (id_a, tx_a, mut rx_a) = member();
        let (id_b, tx_b, mut rx_b) = member();
        registry.join("room:1", id_a, tx_a);
        registry.join("room:1", id_b, tx_b);

        let delivered = registry.broadcast("room:1", &event("hi"));
        assert_eq!(delivered, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn broadcast_does_not_cross_groups() {
        let registry = GroupRegistry::new();
        let (id_a, tx_a, mut rx_a) = member();
        let (id_b, tx_b, mut rx_b) = member();
        registry.join("room:1", id_a, tx_a);
        registry.join("room:2", id_b, tx_b);

        registry.broadcast("room:1", &event("hi"));
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn leave_is_idempotent() {
        let registry = GroupRegistry::new();
        let (id, tx, _rx) = member();
        registry.join("room:1", id, tx);

        registry.leave("room:1", id);
        registry.leave("room:1", id);
        registry.leave("room:never-existed", id);

        assert_eq!(registry.member_count("room:1"), 0);
    }

    #[test]
    fn closed_recipient_does_not_abort_fanout() {
        let registry = GroupRegistry::new();
        let (id_dead, tx_dead, rx_dead) = member();
        let (id_live, tx_live, mut rx_live) = member();
        registry.join("room:1", id_dead, tx_dead);
        registry.join("room:1", id_live, tx_live);
        drop(rx_dead);

        let delivered = registry.broadcast("room:1", &event("still here"));
        assert_eq!(delivered, 1);
        assert!(rx_live.try_recv().is_ok());
    }
}
