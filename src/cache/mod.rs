//! Ephemeral fast-path cache of recent messages.
//!
//! A per-group, most-recent-first list of denormalized message snapshots,
//! independent of the durable store. Process-lifetime only: entries are
//! evicted when a group exceeds its depth and everything is lost on
//! restart, both of which the contract tolerates. Writes happen after the
//! durable write and before broadcast.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Default per-group depth when the config does not override it.
pub const DEFAULT_CACHE_DEPTH: usize = 100;

/// Denormalized snapshot of one delivered message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub sender: String,
    pub text: Option<String>,
    pub audio_ref: Option<String>,
    pub file_ref: Option<String>,
    pub sent_at: String,
}

/// Recency-ordered recent-message store, keyed by group key.
#[derive(Clone)]
pub struct RecentCache {
    groups: Arc<DashMap<String, VecDeque<CacheEntry>>>,
    depth: usize,
}

impl RecentCache {
    pub fn new(depth: usize) -> Self {
        Self {
            groups: Arc::new(DashMap::new()),
            depth,
        }
    }

    /// Push an entry to the front of the group's list, evicting the oldest
    /// entry past the depth bound. Best-effort: no uniqueness requirement.
    pub fn push(&self, group_key: &str, entry: CacheEntry) {
        let mut list = self.groups.entry(group_key.to_string()).or_default();
        list.push_front(entry);
        while list.len() > self.depth {
            list.pop_back();
        }
    }

    /// Snapshot of a group's entries, most recent first.
    pub fn recent(&self, group_key: &str) -> Vec<CacheEntry> {
        self.groups
            .get(group_key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for RecentCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DEPTH)
    }
}
