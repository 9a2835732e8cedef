use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use hive_core::PROTOCOL_VERSION;

use crate::{
    connection::ConnectionHandle,
    protocol::{ErrorShape, Frame},
    state::GatewayState,
};

// ── Types ────────────────────────────────────────────────────────────────────

/// Context passed to every method handler.
pub struct MethodContext {
    pub request_id: String,
    pub method: String,
    pub params: Value,
    pub conn: ConnectionHandle,
    pub state: Arc<GatewayState>,
}

/// The result a method handler produces.
pub type MethodResult = Result<Value, ErrorShape>;

/// A boxed async method handler.
pub type HandlerFn =
    Box<dyn Fn(MethodContext) -> Pin<Box<dyn Future<Output = MethodResult> + Send>> + Send + Sync>;

// ── Authorization ────────────────────────────────────────────────────────────

/// Methods that destroy history; operators only.
const OPERATOR_METHODS: &[&str] = &["session.delete", "session.clear"];

fn authorize_method(method: &str, conn: &ConnectionHandle) -> Option<ErrorShape> {
    if OPERATOR_METHODS.contains(&method) && !conn.role().is_privileged() {
        return Some(ErrorShape::unauthorized(format!(
            "{method} requires the operator role"
        )));
    }
    None
}

// ── Params ───────────────────────────────────────────────────────────────────

/// Absent or null params read as an empty object.
fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, ErrorShape> {
    let params = if params.is_null() {
        json!({})
    } else {
        params.clone()
    };
    serde_json::from_value(params).map_err(|e| ErrorShape::invalid_params(format!("invalid params: {e}")))
}

#[derive(Deserialize)]
struct CreateParams {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatParams {
    #[serde(default)]
    session_id: Option<String>,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionParams {
    session_id: String,
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Closed table of request handlers, keyed by method name.
pub struct MethodRegistry {
    handlers: HashMap<String, HandlerFn>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            handlers: HashMap::new(),
        };
        reg.register_defaults();
        reg
    }

    pub fn register(&mut self, method: impl Into<String>, handler: HandlerFn) {
        self.handlers.insert(method.into(), handler);
    }

    /// Run the handler for a request. Always yields exactly one response
    /// carrying the request's id.
    pub async fn dispatch(&self, ctx: MethodContext) -> Frame {
        let method = ctx.method.clone();
        let request_id = ctx.request_id.clone();
        let conn_id = ctx.conn.id().to_string();

        if let Some(err) = authorize_method(&method, &ctx.conn) {
            warn!(method = %method, conn_id = %conn_id, code = %err.code, "method auth denied");
            return Frame::err(request_id, err);
        }

        let Some(handler) = self.handlers.get(&method) else {
            warn!(method = %method, conn_id = %conn_id, "unknown method");
            return Frame::err(request_id, ErrorShape::unknown_method(&method));
        };

        debug!(method = %method, request_id = %request_id, conn_id = %conn_id, "dispatching method");
        match handler(ctx).await {
            Ok(payload) => {
                debug!(method = %method, request_id = %request_id, "method ok");
                Frame::ok(request_id, payload)
            }
            Err(err) => {
                warn!(method = %method, request_id = %request_id, code = %err.code, msg = %err.message, "method error");
                Frame::err(request_id, err)
            }
        }
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    fn register_defaults(&mut self) {
        self.register_handshake_methods();
        self.register_session_methods();
        self.register_chat_methods();
    }

    fn register_handshake_methods(&mut self) {
        self.register(
            "connect",
            Box::new(|_ctx| {
                Box::pin(async move {
                    Ok(json!({ "type": "hello-ok", "protocol": PROTOCOL_VERSION }))
                })
            }),
        );
    }

    fn register_session_methods(&mut self) {
        // session.create
        self.register(
            "session.create",
            Box::new(|ctx| {
                Box::pin(async move {
                    let params: CreateParams = parse_params(&ctx.params)?;
                    let session = ctx
                        .state
                        .store
                        .create(params.name.as_deref().unwrap_or_default());
                    ctx.conn.bind_session(session.id.clone());
                    to_payload(&session)
                })
            }),
        );

        // session.list
        self.register(
            "session.list",
            Box::new(|ctx| Box::pin(async move { to_payload(&ctx.state.store.list()) })),
        );

        // session.get
        self.register(
            "session.get",
            Box::new(|ctx| {
                Box::pin(async move {
                    let params: SessionParams = parse_params(&ctx.params)?;
                    let session = ctx
                        .state
                        .store
                        .get(&params.session_id)
                        .ok_or_else(|| ErrorShape::session_not_found(&params.session_id))?;
                    to_payload(&session)
                })
            }),
        );

        // session.history
        self.register(
            "session.history",
            Box::new(|ctx| {
                Box::pin(async move {
                    let params: SessionParams = parse_params(&ctx.params)?;
                    let messages = ctx.state.store.get_messages(&params.session_id)?;
                    Ok(json!({ "sessionId": params.session_id, "messages": messages }))
                })
            }),
        );

        // session.delete
        self.register(
            "session.delete",
            Box::new(|ctx| {
                Box::pin(async move {
                    let params: SessionParams = parse_params(&ctx.params)?;
                    let deleted = ctx.state.store.delete(&params.session_id);
                    Ok(json!({ "sessionId": params.session_id, "deleted": deleted }))
                })
            }),
        );

        // session.clear
        self.register(
            "session.clear",
            Box::new(|ctx| {
                Box::pin(async move {
                    let params: SessionParams = parse_params(&ctx.params)?;
                    ctx.state.store.clear(&params.session_id)?;
                    Ok(json!({ "sessionId": params.session_id, "cleared": true }))
                })
            }),
        );
    }

    fn register_chat_methods(&mut self) {
        self.register(
            "chat.send",
            Box::new(|ctx| {
                Box::pin(async move {
                    let params: ChatParams = parse_params(&ctx.params)?;
                    if params.message.trim().is_empty() {
                        return Err(ErrorShape::invalid_params("message must not be empty"));
                    }

                    let session_id = match params.session_id.filter(|id| !id.is_empty()) {
                        Some(id) => id,
                        None => bound_or_new_session(&ctx),
                    };

                    let reply = ctx.state.chat_turn(&session_id, &params.message).await?;
                    Ok(json!({
                        "sessionId": session_id,
                        "messageId": reply.id,
                        "response": reply.content,
                    }))
                })
            }),
        );
    }
}

/// The connection's bound session while it still exists, else a new one
/// that becomes the binding
fn bound_or_new_session(ctx: &MethodContext) -> String {
    if let Some(id) = ctx.conn.bound_session() {
        if ctx.state.store.exists(&id) {
            return id;
        }
    }
    let session = ctx.state.store.create("");
    ctx.conn.bind_session(session.id.clone());
    session.id
}

fn to_payload<T: serde::Serialize>(value: &T) -> MethodResult {
    serde_json::to_value(value).map_err(|e| ErrorShape::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionRole;
    use crate::testing::{test_state, test_state_with};
    use hive_channels::adapter::APOLOGY_TEXT;
    use hive_core::Role;

    fn request(
        state: &Arc<GatewayState>,
        conn: &ConnectionHandle,
        id: &str,
        method: &str,
        params: Value,
    ) -> MethodContext {
        MethodContext {
            request_id: id.to_string(),
            method: method.to_string(),
            params,
            conn: conn.clone(),
            state: Arc::clone(state),
        }
    }

    fn unwrap_response(frame: Frame) -> (String, bool, Option<Value>, Option<ErrorShape>) {
        match frame {
            Frame::Response {
                id,
                ok,
                payload,
                error,
            } => (id, ok, payload, error),
            other => panic!("expected response, got {other:?}"),
        }
    }

    fn operator() -> ConnectionHandle {
        ConnectionHandle::new(ConnectionRole::Operator, 16).0
    }

    #[tokio::test]
    async fn test_unknown_method_keeps_id() {
        let (state, methods) = test_state();
        let conn = operator();

        let frame = methods
            .dispatch(request(&state, &conn, "abc-1", "bogus", Value::Null))
            .await;
        let (id, ok, _, error) = unwrap_response(frame);

        assert_eq!(id, "abc-1");
        assert!(!ok);
        let error = error.unwrap();
        assert_eq!(error.code, "UNKNOWN_METHOD");
        assert!(error.message.contains("bogus"));
    }

    #[tokio::test]
    async fn test_connect_handshake() {
        let (state, methods) = test_state();
        let conn = operator();

        let frame = methods
            .dispatch(request(&state, &conn, "1", "connect", Value::Null))
            .await;
        let (_, ok, payload, _) = unwrap_response(frame);
        assert!(ok);
        assert_eq!(payload.unwrap(), json!({"type": "hello-ok", "protocol": 1}));
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn test_create_binds_and_lists() {
        let (state, methods) = test_state();
        let conn = operator();

        let frame = methods
            .dispatch(request(&state, &conn, "1", "session.create", json!({"name": "Ops"})))
            .await;
        let (_, ok, payload, _) = unwrap_response(frame);
        assert!(ok);
        let payload = payload.unwrap();
        assert_eq!(payload["name"], "Ops");
        assert_eq!(conn.bound_session().as_deref(), payload["id"].as_str());

        let frame = methods
            .dispatch(request(&state, &conn, "2", "session.create", Value::Null))
            .await;
        let (_, ok, payload, _) = unwrap_response(frame);
        assert!(ok);
        assert!(!payload.unwrap()["name"].as_str().unwrap().is_empty());

        let frame = methods
            .dispatch(request(&state, &conn, "3", "session.list", Value::Null))
            .await;
        let (_, _, payload, _) = unwrap_response(frame);
        assert_eq!(payload.unwrap().as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_chat_send_invalid_params_appends_nothing() {
        let (state, methods) = test_state();
        let conn = operator();
        let session = state.store.create("target");

        for params in [
            json!({"sessionId": session.id}),
            json!({"sessionId": session.id, "message": 42}),
            json!("just a string"),
            json!({"sessionId": session.id, "message": "   "}),
        ] {
            let frame = methods
                .dispatch(request(&state, &conn, "x", "chat.send", params))
                .await;
            let (id, ok, _, error) = unwrap_response(frame);
            assert_eq!(id, "x");
            assert!(!ok);
            assert_eq!(error.unwrap().code, "INVALID_PARAMS");
        }

        assert!(state.store.get_messages(&session.id).unwrap().is_empty());
        assert_eq!(state.store.len(), 1);
    }

    #[tokio::test]
    async fn test_chat_send_records_turn() {
        let (state, methods) = test_state();
        let conn = operator();
        let session = state.store.create("target");

        let frame = methods
            .dispatch(request(
                &state,
                &conn,
                "c1",
                "chat.send",
                json!({"sessionId": session.id, "message": "hi"}),
            ))
            .await;
        let (_, ok, payload, _) = unwrap_response(frame);
        assert!(ok);
        assert_eq!(payload.unwrap()["response"], "Echo: hi");

        let messages = state.store.get_messages(&session.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_chat_send_unknown_session() {
        let (state, methods) = test_state();
        let conn = operator();

        let frame = methods
            .dispatch(request(
                &state,
                &conn,
                "c1",
                "chat.send",
                json!({"sessionId": "sess_missing", "message": "hi"}),
            ))
            .await;
        let (_, ok, _, error) = unwrap_response(frame);
        assert!(!ok);
        assert_eq!(error.unwrap().code, "SESSION_NOT_FOUND");
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn test_chat_send_without_session_uses_binding() {
        let (state, methods) = test_state();
        let conn = operator();

        for (id, text) in [("1", "first"), ("2", "second")] {
            let frame = methods
                .dispatch(request(&state, &conn, id, "chat.send", json!({"message": text})))
                .await;
            assert!(unwrap_response(frame).1);
        }

        assert_eq!(state.store.len(), 1);
        let bound = conn.bound_session().unwrap();
        assert_eq!(state.store.get_messages(&bound).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_chat_send_provider_failure() {
        let (state, methods) = test_state_with(true);
        let conn = operator();
        let session = state.store.create("target");

        let frame = methods
            .dispatch(request(
                &state,
                &conn,
                "c1",
                "chat.send",
                json!({"sessionId": session.id, "message": "hi"}),
            ))
            .await;
        let (_, ok, _, error) = unwrap_response(frame);
        assert!(!ok);
        let error = error.unwrap();
        assert_eq!(error.code, "INTERNAL_ERROR");
        assert_eq!(error.message, APOLOGY_TEXT);

        let messages = state.store.get_messages(&session.id).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_destructive_methods_need_operator() {
        let (state, methods) = test_state();
        let node = ConnectionHandle::new(ConnectionRole::Node, 16).0;
        let session = state.store.create("keep");

        for method in ["session.delete", "session.clear"] {
            let frame = methods
                .dispatch(request(&state, &node, "d", method, json!({"sessionId": session.id})))
                .await;
            let (_, ok, _, error) = unwrap_response(frame);
            assert!(!ok);
            assert_eq!(error.unwrap().code, "UNAUTHORIZED");
        }
        assert!(state.store.exists(&session.id));

        let frame = methods
            .dispatch(request(&state, &operator(), "d", "session.delete", json!({"sessionId": session.id})))
            .await;
        let (_, ok, payload, _) = unwrap_response(frame);
        assert!(ok);
        assert_eq!(payload.unwrap()["deleted"], true);
        assert!(!state.store.exists(&session.id));
    }

    #[tokio::test]
    async fn test_history_and_get() {
        let (state, methods) = test_state();
        let conn = operator();
        let session = state.store.create("s");
        state.store.add_message(&session.id, Role::User, "hi").unwrap();

        let frame = methods
            .dispatch(request(&state, &conn, "h", "session.history", json!({"sessionId": session.id})))
            .await;
        let (_, ok, payload, _) = unwrap_response(frame);
        assert!(ok);
        assert_eq!(payload.unwrap()["messages"][0]["content"], "hi");

        let frame = methods
            .dispatch(request(&state, &conn, "g", "session.get", json!({"sessionId": "sess_nope"})))
            .await;
        let (_, ok, _, error) = unwrap_response(frame);
        assert!(!ok);
        assert_eq!(error.unwrap().code, "SESSION_NOT_FOUND");
    }

    #[test]
    fn test_method_table() {
        let names = MethodRegistry::new().method_names();
        assert_eq!(
            names,
            vec![
                "chat.send",
                "connect",
                "session.clear",
                "session.create",
                "session.delete",
                "session.get",
                "session.history",
                "session.list",
            ]
        );
    }
}
