//! Hive Gateway - real-time control plane for conversation sessions
//!
//! Accepts many concurrent WebSocket connections, speaks a small
//! request/response/event protocol over each, and fans events out to every
//! live peer through the Hub. A plain HTTP surface covers clients that do
//! not keep a socket open.

mod connection;
mod gateway;
mod http;
mod hub;
mod methods;
mod protocol;
mod state;

#[cfg(test)]
mod testing;

pub use connection::{serve_connection, ConnectionHandle, ConnectionRole, EnqueueError};
pub use gateway::{Gateway, GatewayError, GatewaySettings};
pub use hub::{Hub, HubError};
pub use methods::{HandlerFn, MethodContext, MethodRegistry, MethodResult};
pub use protocol::{error_codes, ErrorShape, Frame, ProtocolError};
pub use state::GatewayState;
