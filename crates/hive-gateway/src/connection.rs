//! Per-peer connection: the handle the Hub keeps, and the two pumps that
//! move frames between the transport and the outbound queue.

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use hive_core::{new_id, IdPrefix, VERSION};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, info, warn};

use crate::methods::{MethodContext, MethodRegistry};
use crate::protocol::Frame;
use crate::state::GatewayState;

/// Privilege tag of a peer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionRole {
    /// Dashboards and CLIs; may mutate any session
    #[default]
    Operator,
    /// Unprivileged peers such as device nodes
    Node,
}

impl ConnectionRole {
    /// Role requested in the upgrade query. Anything but `node` is an
    /// operator.
    pub fn from_query(role: Option<&str>) -> Self {
        match role {
            Some(r) if r.eq_ignore_ascii_case("node") => ConnectionRole::Node,
            _ => ConnectionRole::Operator,
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, ConnectionRole::Operator)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionRole::Operator => "operator",
            ConnectionRole::Node => "node",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("outbound queue full")]
    Full,
    #[error("outbound queue closed")]
    Closed,
}

/// Cheap, cloneable handle to one live connection.
///
/// The outbound queue carries already-serialized frames so a broadcast
/// encodes once and shares the bytes.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Arc<str>,
    role: ConnectionRole,
    sender: mpsc::Sender<Arc<str>>,
    closed: CancellationToken,
    session: Arc<Mutex<Option<String>>>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh id and the receiving end of its
    /// outbound queue
    pub fn new(role: ConnectionRole, capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: Arc::from(new_id(IdPrefix::Client)),
            role,
            sender,
            closed: CancellationToken::new(),
            session: Arc::new(Mutex::new(None)),
        };
        (handle, receiver)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    /// Queue serialized bytes without waiting
    pub fn try_enqueue(&self, frame: Arc<str>) -> Result<(), EnqueueError> {
        if self.closed.is_cancelled() {
            return Err(EnqueueError::Closed);
        }
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Serialize and queue a frame
    pub fn send_frame(&self, frame: &Frame) -> Result<(), EnqueueError> {
        match frame.encode() {
            Ok(text) => self.try_enqueue(Arc::from(text)),
            Err(e) => {
                warn!(conn_id = %self.id, error = %e, "dropping unencodable frame");
                Ok(())
            }
        }
    }

    /// Session the connection is bound to, if any
    pub fn bound_session(&self) -> Option<String> {
        self.session.lock().clone()
    }

    pub fn bind_session(&self, session_id: impl Into<String>) {
        *self.session.lock() = Some(session_id.into());
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the Hub has closed this connection
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Only the Hub calls this, when it removes the connection
    pub(crate) fn close(&self) {
        self.closed.cancel();
    }
}

/// Drive one connection from registration to teardown.
///
/// Registers with the Hub, sends the `connected` welcome event, then runs
/// the outbound pump on its own task and the inbound pump on this one.
/// Either pump ending deregisters the connection, which stops the other.
pub async fn serve_connection<Si, St, E>(
    mut sink: Si,
    stream: St,
    role: ConnectionRole,
    state: Arc<GatewayState>,
    methods: Arc<MethodRegistry>,
) where
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: Display + Send,
    St: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Display + Send,
{
    let (conn, rx) = ConnectionHandle::new(role, state.config.queue_capacity);
    let conn_id = conn.id().to_string();

    if let Err(e) = state.hub.register(conn.clone()).await {
        warn!(conn_id = %conn_id, error = %e, "registration refused");
        let _ = sink.close().await;
        return;
    }
    info!(conn_id = %conn_id, role = conn.role().as_str(), "connection registered");

    let welcome = Frame::event("connected", json!({ "clientId": conn_id, "version": VERSION }));
    let _ = conn.send_frame(&welcome);

    let outbound = {
        let hub = state.hub.clone();
        let conn = conn.clone();
        tokio::spawn(async move {
            outbound_pump(sink, rx, &conn).await;
            hub.unregister(conn.id()).await;
        })
    };

    inbound_pump(stream, &conn, &state, &methods).await;
    state.hub.unregister(&conn_id).await;

    let _ = outbound.await;
    info!(conn_id = %conn_id, "connection closed");
}

/// Grace period a closed connection gets to write frames already queued
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Write queued frames to the transport in FIFO order until the Hub closes
/// the connection or a write fails, then close the transport. Frames queued
/// before the close are still written, within [`FLUSH_TIMEOUT`].
pub async fn outbound_pump<Si>(mut sink: Si, mut rx: mpsc::Receiver<Arc<str>>, conn: &ConnectionHandle)
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    let closed_by_hub = write_until_closed(&mut sink, &mut rx, conn).await;

    rx.close();
    if closed_by_hub {
        match tokio::time::timeout(FLUSH_TIMEOUT, flush_queued(&mut sink, &mut rx)).await {
            Ok(Ok(0)) => {}
            Ok(Ok(flushed)) => debug!(conn_id = %conn.id(), flushed, "flushed queued frames"),
            Ok(Err(e)) => debug!(conn_id = %conn.id(), error = %e, "write failed while flushing"),
            Err(_) => warn!(conn_id = %conn.id(), "flush timed out, dropping queued frames"),
        }
    }

    if let Err(e) = sink.close().await {
        debug!(conn_id = %conn.id(), error = %e, "close failed");
    }
}

/// True when the Hub closed the connection, false when the transport failed.
async fn write_until_closed<Si>(
    sink: &mut Si,
    rx: &mut mpsc::Receiver<Arc<str>>,
    conn: &ConnectionHandle,
) -> bool
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = conn.closed() => return true,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => return true,
            },
        };

        let send = sink.send(Message::Text(frame.to_string()));
        tokio::pin!(send);
        let write = tokio::select! {
            biased;
            result = &mut send => result,
            // closed mid-write: finish this frame under the flush deadline
            _ = conn.closed() => match tokio::time::timeout(FLUSH_TIMEOUT, &mut send).await {
                Ok(Ok(())) => return true,
                Ok(Err(e)) => Err(e),
                Err(_) => {
                    warn!(conn_id = %conn.id(), "write stalled after close");
                    return false;
                }
            },
        };
        if let Err(e) = write {
            debug!(conn_id = %conn.id(), error = %e, "write failed");
            return false;
        }
    }
}

async fn flush_queued<Si>(sink: &mut Si, rx: &mut mpsc::Receiver<Arc<str>>) -> Result<usize, Si::Error>
where
    Si: Sink<Message> + Unpin,
{
    let mut flushed = 0;
    while let Ok(frame) = rx.try_recv() {
        sink.send(Message::Text(frame.to_string())).await?;
        flushed += 1;
    }
    Ok(flushed)
}

/// Read frames from the transport and dispatch them in arrival order until
/// the peer goes away, the transport fails or the Hub closes the connection.
pub async fn inbound_pump<St, E>(
    mut stream: St,
    conn: &ConnectionHandle,
    state: &Arc<GatewayState>,
    methods: &MethodRegistry,
) where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = conn.closed() => break,
            next = stream.next() => next,
        };

        let text = match next {
            None | Some(Ok(Message::Close(_))) => {
                debug!(conn_id = %conn.id(), "peer closed");
                break;
            }
            Some(Err(e)) => {
                debug!(conn_id = %conn.id(), error = %e, "transport error");
                break;
            }
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!(conn_id = %conn.id(), "dropping non-utf8 binary frame");
                    continue;
                }
            },
            Some(Ok(_)) => continue,
        };

        if !handle_text(&text, conn, state, methods).await {
            break;
        }
    }
}

/// Returns false when the connection should stop reading
async fn handle_text(
    text: &str,
    conn: &ConnectionHandle,
    state: &Arc<GatewayState>,
    methods: &MethodRegistry,
) -> bool {
    let frame = match Frame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(conn_id = %conn.id(), error = %e, "dropping undecodable frame");
            return true;
        }
    };

    let (id, method, params) = match frame {
        Frame::Request { id, method, params } => (id, method, params),
        Frame::Event { event, .. } => {
            debug!(conn_id = %conn.id(), event = %event, "ignoring client event");
            return true;
        }
        Frame::Response { id, .. } => {
            debug!(conn_id = %conn.id(), id = %id, "ignoring client response");
            return true;
        }
    };

    let ctx = MethodContext {
        request_id: id,
        method,
        params: params.unwrap_or_default(),
        conn: conn.clone(),
        state: Arc::clone(state),
    };
    let response = methods.dispatch(ctx).await;

    match conn.send_frame(&response) {
        Ok(()) => true,
        Err(EnqueueError::Full) => {
            warn!(conn_id = %conn.id(), "outbound queue full, closing connection");
            state.hub.unregister(conn.id()).await;
            false
        }
        Err(EnqueueError::Closed) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_state;
    use futures::channel::mpsc as fmpsc;
    use serde_json::Value;

    fn text(frame: &Value) -> Result<Message, std::io::Error> {
        Ok(Message::Text(frame.to_string()))
    }

    async fn next_frame(rx: &mut fmpsc::UnboundedReceiver<Message>) -> Value {
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.next())
            .await
            .expect("timed out waiting for frame")
            .expect("sink closed");
        match msg {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_role_from_query() {
        assert_eq!(ConnectionRole::from_query(None), ConnectionRole::Operator);
        assert_eq!(ConnectionRole::from_query(Some("NODE")), ConnectionRole::Node);
        assert_eq!(ConnectionRole::from_query(Some("admin")), ConnectionRole::Operator);
        assert!(!ConnectionRole::Node.is_privileged());
    }

    #[tokio::test]
    async fn test_enqueue_full_and_closed() {
        let (conn, mut rx) = ConnectionHandle::new(ConnectionRole::Operator, 1);
        conn.try_enqueue(Arc::from("a")).unwrap();
        assert_eq!(conn.try_enqueue(Arc::from("b")), Err(EnqueueError::Full));
        assert_eq!(rx.recv().await.as_deref(), Some("a"));

        conn.close();
        assert_eq!(conn.try_enqueue(Arc::from("c")), Err(EnqueueError::Closed));
    }

    #[test]
    fn test_session_binding_is_shared_between_clones() {
        let (conn, _rx) = ConnectionHandle::new(ConnectionRole::Operator, 4);
        let other = conn.clone();
        assert_eq!(conn.bound_session(), None);
        other.bind_session("sess_1");
        assert_eq!(conn.bound_session().as_deref(), Some("sess_1"));
    }

    #[tokio::test]
    async fn test_outbound_pump_writes_in_order_and_stops_on_close() {
        let (conn, rx) = ConnectionHandle::new(ConnectionRole::Operator, 8);
        let (sink, mut written) = fmpsc::unbounded::<Message>();

        conn.try_enqueue(Arc::from("one")).unwrap();
        conn.try_enqueue(Arc::from("two")).unwrap();

        let pump_conn = conn.clone();
        let pump = tokio::spawn(async move { outbound_pump(sink, rx, &pump_conn).await });

        assert_eq!(written.next().await, Some(Message::Text("one".to_string())));
        assert_eq!(written.next().await, Some(Message::Text("two".to_string())));

        conn.close();
        pump.await.unwrap();
        // sink closed by the pump
        assert_eq!(written.next().await, None);
    }

    #[tokio::test]
    async fn test_outbound_pump_flushes_queue_after_close() {
        let (conn, rx) = ConnectionHandle::new(ConnectionRole::Operator, 8);
        let (sink, mut written) = fmpsc::unbounded::<Message>();

        conn.try_enqueue(Arc::from("queued-1")).unwrap();
        conn.try_enqueue(Arc::from("queued-2")).unwrap();
        conn.close();

        outbound_pump(sink, rx, &conn).await;

        assert_eq!(written.next().await, Some(Message::Text("queued-1".to_string())));
        assert_eq!(written.next().await, Some(Message::Text("queued-2".to_string())));
        assert_eq!(written.next().await, None);
    }

    #[tokio::test]
    async fn test_session_over_channels() {
        let (state, methods) = test_state();
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let (peer, stream) = fmpsc::unbounded::<Result<Message, std::io::Error>>();

        let task = tokio::spawn(serve_connection(
            sink,
            stream,
            ConnectionRole::Operator,
            state.clone(),
            methods,
        ));

        let welcome = next_frame(&mut written).await;
        assert_eq!(welcome["type"], "event");
        assert_eq!(welcome["event"], "connected");
        assert_eq!(welcome["payload"]["version"], VERSION);
        assert!(welcome["payload"]["clientId"]
            .as_str()
            .unwrap()
            .starts_with("client_"));

        // garbage is dropped, the connection stays usable
        peer.unbounded_send(Ok(Message::Text("{not json".to_string())))
            .unwrap();
        peer.unbounded_send(text(&json!({"type": "req", "id": "r1", "method": "connect"})))
            .unwrap();
        peer.unbounded_send(text(&json!({"type": "req", "id": "r2", "method": "bogus"})))
            .unwrap();

        let hello = next_frame(&mut written).await;
        assert_eq!(hello["id"], "r1");
        assert_eq!(hello["ok"], true);
        assert_eq!(hello["payload"]["type"], "hello-ok");

        let unknown = next_frame(&mut written).await;
        assert_eq!(unknown["id"], "r2");
        assert_eq!(unknown["ok"], false);
        assert_eq!(unknown["error"]["code"], "UNKNOWN_METHOD");

        assert_eq!(state.hub.connection_count().await, 1);
        drop(peer);
        task.await.unwrap();
        assert_eq!(state.hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_request_without_id_or_method_still_answered() {
        let (state, methods) = test_state();
        let (conn, mut rx) = ConnectionHandle::new(ConnectionRole::Operator, 4);
        state.hub.register(conn.clone()).await.unwrap();

        assert!(handle_text(r#"{"type":"req","method":"bogus"}"#, &conn, &state, &methods).await);
        let reply: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(reply["type"], "res");
        assert_eq!(reply["ok"], false);
        assert!(reply.get("id").is_none());
        assert_eq!(reply["error"]["code"], "UNKNOWN_METHOD");

        assert!(handle_text(r#"{"type":"req","id":"r9"}"#, &conn, &state, &methods).await);
        let reply: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(reply["id"], "r9");
        assert_eq!(reply["error"]["code"], "UNKNOWN_METHOD");
    }

    #[tokio::test]
    async fn test_full_queue_force_closes_own_connection() {
        let (state, methods) = test_state();
        let (conn, _rx) = ConnectionHandle::new(ConnectionRole::Operator, 1);
        state.hub.register(conn.clone()).await.unwrap();
        conn.try_enqueue(Arc::from("filler")).unwrap();

        let request = json!({"type": "req", "id": "r1", "method": "connect"}).to_string();
        let keep_reading = handle_text(&request, &conn, &state, &methods).await;

        assert!(!keep_reading);
        assert!(conn.is_closed());
        assert_eq!(state.hub.connection_count().await, 0);
    }
}
