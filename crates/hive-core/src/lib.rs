//! Shared vocabulary for the hive workspace.
//!
//! Every other crate speaks in terms of these types: the closed set of
//! conversation roles and the identifier scheme used for sessions,
//! messages and connections.

pub mod id;
pub mod types;

pub use id::{new_id, IdPrefix};
pub use types::{ParseRoleError, Role};

/// Version reported to peers in the `connected` event and the health endpoint.
pub const VERSION: &str = "0.1.0";

/// Wire protocol revision acknowledged by the `connect` handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Agent every new session is bound to unless told otherwise.
pub const DEFAULT_AGENT_ID: &str = "main";
