//! # Session Store
//!
//! The process-wide mapping from session id to [`Session`].
//!
//! Every operation takes the store-wide lock for the duration of a short,
//! non-blocking critical section; the lock is never held across an `.await`.
//! Mutations on different sessions still serialize on it. Sharding by
//! session id is the next step if contention ever shows up.

use std::collections::HashMap;

use chrono::Utc;
use hive_core::Role;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::types::{Message, Session, SessionSummary};

/// Store configuration
#[derive(Debug, Clone, Default)]
pub struct SessionStoreConfig {
    /// Upper bound on stored sessions. When reached, creating a session
    /// evicts the least recently updated one. `None` means unbounded.
    pub max_sessions: Option<usize>,
}

/// Concurrency-safe, in-memory session store
#[derive(Debug, Default)]
pub struct SessionStore {
    config: SessionStoreConfig,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    /// Create an empty, unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given configuration
    pub fn with_config(config: SessionStoreConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new session and return a snapshot of it
    pub fn create(&self, name: &str) -> Session {
        let session = Session::new(name);
        let mut sessions = self.sessions.write();
        self.make_room(&mut sessions);
        sessions.insert(session.id.clone(), session.clone());
        debug!(session_id = %session.id, name = %session.name, "session created");
        session
    }

    /// Return the session stored under `key`, creating it with that id on
    /// first contact. Used by channel adapters whose peers have a stable key.
    pub fn get_or_create(&self, key: &str, name: &str) -> Session {
        let mut sessions = self.sessions.write();
        if let Some(existing) = sessions.get(key) {
            return existing.clone();
        }
        self.make_room(&mut sessions);
        let session = Session::with_id(key, name);
        sessions.insert(session.id.clone(), session.clone());
        debug!(session_id = %key, "keyed session created");
        session
    }

    /// Read-only lookup
    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    /// Whether a session exists
    pub fn exists(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Snapshot of every stored session. Order is unspecified.
    pub fn list(&self) -> Vec<Session> {
        self.sessions.read().values().cloned().collect()
    }

    /// Snapshot of every stored session without message bodies
    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.sessions.read().values().map(SessionSummary::from).collect()
    }

    /// Append a message to a session
    pub fn add_message(
        &self,
        id: &str,
        role: Role,
        content: impl Into<String>,
    ) -> SessionResult<Message> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::not_found(id))?;
        let message = Message::new(role, content);
        session.messages.push(message.clone());
        session.touch();
        Ok(message)
    }

    /// Snapshot of a session's messages in append order
    pub fn get_messages(&self, id: &str) -> SessionResult<Vec<Message>> {
        self.sessions
            .read()
            .get(id)
            .map(|session| session.messages.clone())
            .ok_or_else(|| SessionError::not_found(id))
    }

    /// Remove a session. Returns whether anything was removed.
    pub fn delete(&self, id: &str) -> bool {
        let removed = self.sessions.write().remove(id).is_some();
        if removed {
            debug!(session_id = %id, "session deleted");
        }
        removed
    }

    /// Empty a session's messages, keeping its identity, name and metadata
    pub fn clear(&self, id: &str) -> SessionResult<()> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::not_found(id))?;
        session.messages.clear();
        session.touch();
        Ok(())
    }

    /// Set a single metadata entry on a session
    pub fn update_metadata(
        &self,
        id: &str,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> SessionResult<()> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::not_found(id))?;
        session.metadata.insert(key.into(), value);
        session.touch();
        Ok(())
    }

    /// Number of stored sessions
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Remove sessions idle for longer than `max_idle`. Returns how many
    /// were removed.
    pub fn prune_idle(&self, max_idle: chrono::Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| session.idle_time(now) <= max_idle);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "pruned idle sessions");
        }
        removed
    }

    fn make_room(&self, sessions: &mut HashMap<String, Session>) {
        let Some(max) = self.config.max_sessions else {
            return;
        };
        while sessions.len() >= max.max(1) {
            let oldest = sessions
                .values()
                .min_by_key(|session| session.updated_at)
                .map(|session| session.id.clone());
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                    debug!(session_id = %id, "evicted least recently updated session");
                }
                None => break,
            }
        }
    }
}
