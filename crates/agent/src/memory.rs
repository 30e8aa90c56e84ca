//! Session memory: conversation history and continuation token per session id.
//!
//! Entries expire `ttl` after their last write. Expired entries are dropped
//! lazily on read and by [`SessionSweeper`]. Each entry is tagged with the
//! user and tenant that wrote it so a reused session id never carries one
//! caller's conversation into another's.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use copilot_core::identity::UserContext;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::runtime::{is_well_formed, ConversationItem};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionOwner {
    pub user_id: Option<String>,
    pub tenant_id: Option<i64>,
}

impl SessionOwner {
    pub fn of(user: &UserContext) -> Self {
        Self { user_id: user.id.clone(), tenant_id: user.tenant_id }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConversationEntry {
    pub history: Vec<ConversationItem>,
    pub continuation_token: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub owner: SessionOwner,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Option<ConversationEntry>;

    /// Overwrites the entry with a fresh timestamp. Malformed histories are ignored.
    async fn put(
        &self,
        session_id: &str,
        history: Vec<ConversationItem>,
        continuation_token: Option<String>,
        owner: SessionOwner,
    );

    async fn remove(&self, session_id: &str);

    /// Drops every expired entry and returns how many were removed.
    async fn sweep(&self) -> usize;
}

pub struct InMemoryConversationStore {
    entries: RwLock<HashMap<String, ConversationEntry>>,
    ttl: TimeDelta,
}

impl InMemoryConversationStore {
    pub fn new(ttl: Duration) -> Self {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        Self { entries: RwLock::new(HashMap::new()), ttl }
    }

    pub fn from_millis(ttl_ms: u64) -> Self {
        Self::new(Duration::from_millis(ttl_ms))
    }

    fn is_expired(&self, entry: &ConversationEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.updated_at) > self.ttl
    }

    pub async fn get_at(&self, session_id: &str, now: DateTime<Utc>) -> Option<ConversationEntry> {
        {
            let entries = self.entries.read().await;
            let entry = entries.get(session_id)?;
            if !self.is_expired(entry, now) {
                return Some(entry.clone());
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(session_id).is_some_and(|entry| self.is_expired(entry, now)) {
            entries.remove(session_id);
            debug!(
                event_name = "agent.memory.expired",
                session_id,
                "conversation entry expired on read"
            );
        }
        None
    }

    pub async fn put_at(
        &self,
        session_id: &str,
        history: Vec<ConversationItem>,
        continuation_token: Option<String>,
        owner: SessionOwner,
        now: DateTime<Utc>,
    ) {
        if session_id.trim().is_empty() || !is_well_formed(&history) {
            return;
        }
        let entry = ConversationEntry { history, continuation_token, updated_at: now, owner };
        self.entries.write().await.insert(session_id.to_string(), entry);
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        before - entries.len()
    }

    /// Stored entries including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, session_id: &str) -> Option<ConversationEntry> {
        self.get_at(session_id, Utc::now()).await
    }

    async fn put(
        &self,
        session_id: &str,
        history: Vec<ConversationItem>,
        continuation_token: Option<String>,
        owner: SessionOwner,
    ) {
        self.put_at(session_id, history, continuation_token, owner, Utc::now()).await;
    }

    async fn remove(&self, session_id: &str) {
        self.entries.write().await.remove(session_id);
    }

    async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }
}

/// Background TTL sweep. Holds only a weak reference, so it never keeps the
/// store alive, and stops when the store is dropped or the sweeper is.
pub struct SessionSweeper {
    handle: JoinHandle<()>,
}

impl SessionSweeper {
    pub fn spawn<S>(store: &Arc<S>, interval: Duration) -> Self
    where
        S: ConversationStore + ?Sized + 'static,
    {
        let store: Weak<S> = Arc::downgrade(store);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.sweep().await;
                if removed > 0 {
                    debug!(
                        event_name = "agent.memory.swept",
                        removed,
                        "expired conversation entries removed"
                    );
                }
            }
        });
        Self { handle }
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SessionSweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
