//! # Session Types
//!
//! A session is a named, ordered conversation thread. Messages are only ever
//! appended, so their order is the chronological order and the order the
//! language model sees.

use chrono::{DateTime, Utc};
use hive_core::{new_id, IdPrefix, Role, DEFAULT_AGENT_ID};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single conversation turn. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with a fresh id, stamped now
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(IdPrefix::Message),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Conversation state owned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    pub agent_id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Session {
    /// Create a session with a generated id. An empty name is replaced with
    /// a label derived from the creation time.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(new_id(IdPrefix::Session), name)
    }

    /// Create a session with a caller-chosen id
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        let name = name.into();
        let name = if name.trim().is_empty() {
            now.format("Session %H:%M").to_string()
        } else {
            name
        };
        Self {
            id: id.into(),
            name,
            agent_id: DEFAULT_AGENT_ID.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        }
    }

    /// Update last activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Time since the last append, clear or metadata update
    pub fn idle_time(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.updated_at
    }
}

/// Lightweight view used when the full message history is not wanted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub name: String,
    pub agent_id: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            name: session.name.clone(),
            agent_id: session.agent_id.clone(),
            message_count: session.messages.len(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_name_gets_generated_label() {
        let session = Session::new("");
        assert!(session.name.starts_with("Session "));
        assert!(session.id.starts_with("sess_"));
        assert_eq!(session.agent_id, "main");
        assert!(session.messages.is_empty());
    }

    #[test]
    fn test_session_serializes_camel_case() {
        let session = Session::new("demo");
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["name"], "demo");
        assert_eq!(json["agentId"], "main");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_summary_counts_messages() {
        let mut session = Session::new("demo");
        session.messages.push(Message::new(Role::User, "hi"));
        let summary = SessionSummary::from(&session);
        assert_eq!(summary.message_count, 1);
        assert_eq!(summary.id, session.id);
    }
}
