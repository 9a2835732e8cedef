//! Wire protocol: the frame envelope and error vocabulary exchanged over
//! every connection. Pure (de)serialization, no I/O.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hive_channels::TurnError;
use hive_session::SessionError;

/// Error codes carried in `error.code` of a failed response
pub mod error_codes {
    pub const UNKNOWN_METHOD: &str = "UNKNOWN_METHOD";
    pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
    pub const SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
}

/// One envelope on the wire. The `type` discriminator selects the kind:
/// `req`, `res` or `event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// A missing `id` or `method` decodes as empty so the request still
    /// gets its one response.
    #[serde(rename = "req")]
    Request {
        #[serde(default)]
        id: String,
        #[serde(default)]
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    #[serde(rename = "res")]
    Response {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorShape>,
    },
    #[serde(rename = "event")]
    Event {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

impl Frame {
    pub fn request(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Frame::Request {
            id: id.into(),
            method: method.into(),
            params: Some(params),
        }
    }

    pub fn ok(id: impl Into<String>, payload: Value) -> Self {
        Frame::Response {
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: ErrorShape) -> Self {
        Frame::Response {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }

    pub fn event(event: impl Into<String>, payload: Value) -> Self {
        Frame::Event {
            event: event.into(),
            payload: Some(payload),
        }
    }

    /// Parse one text frame. Malformed JSON and a missing or unknown
    /// discriminator are both reported as errors.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Malformed)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Correlation id for requests and responses
    pub fn id(&self) -> Option<&str> {
        match self {
            Frame::Request { id, .. } | Frame::Response { id, .. } => Some(id),
            Frame::Event { .. } => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Structured error of a failed response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

impl ErrorShape {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn unknown_method(method: &str) -> Self {
        Self::new(error_codes::UNKNOWN_METHOD, format!("unknown method: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, message)
    }

    pub fn session_not_found(id: &str) -> Self {
        Self::new(error_codes::SESSION_NOT_FOUND, format!("session not found: {id}"))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(error_codes::UNAUTHORIZED, message)
    }
}

impl From<SessionError> for ErrorShape {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::SessionNotFound { id } => Self::session_not_found(&id),
        }
    }
}

impl From<TurnError> for ErrorShape {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::Session(e) => e.into(),
            TurnError::EmptyMessage => Self::invalid_params(err.to_string()),
            // provider details stay in the server log
            TurnError::Provider(_) => Self::internal(hive_channels::adapter::APOLOGY_TEXT),
        }
    }
}
