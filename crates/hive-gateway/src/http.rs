//! Plain request/response routes for clients that do not hold a socket.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use hive_channels::{adapter::APOLOGY_TEXT, TurnError};

use crate::gateway::AppState;
use crate::protocol::error_codes;

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/sessions", get(list_sessions_handler))
        .route("/api/chat", post(chat_handler))
}

#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMS, message)
    }
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::Session(e) => {
                Self::new(StatusCode::NOT_FOUND, error_codes::SESSION_NOT_FOUND, e.to_string())
            }
            TurnError::EmptyMessage => Self::bad_request(err.to_string()),
            TurnError::Provider(_) => {
                Self::new(StatusCode::BAD_GATEWAY, error_codes::INTERNAL_ERROR, APOLOGY_TEXT)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": { "code": self.code, "message": self.message } });
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    session_id: Option<String>,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatReply {
    response: String,
    session_id: String,
}

async fn health_handler(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.gateway.health().await)
}

async fn list_sessions_handler(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.gateway.store.list())
}

/// Single non-streaming turn. An empty or missing `sessionId` starts a new
/// session.
async fn chat_handler(
    State(app): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(request) = payload.map_err(|e| {
        warn!(error = %e, "rejecting chat body");
        ApiError::bad_request(e.body_text())
    })?;

    if request.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }

    let store = &app.gateway.store;
    let session_id = match request.session_id.filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => store.create("").id,
    };

    let reply = app.gateway.chat_turn(&session_id, &request.message).await?;
    Ok(Json(ChatReply {
        response: reply.content,
        session_id,
    }))
}
