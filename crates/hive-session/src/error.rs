//! # Session Error Types

use thiserror::Error;

/// Errors raised by the session store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No session is stored under the id
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },
}

impl SessionError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound { id: id.into() }
    }
}

/// Session store result type
pub type SessionResult<T> = Result<T, SessionError>;
