//! Identifier generation.
//!
//! Ids are `<prefix>_<uuid-v4 simple>`. Random ids stay unique under
//! concurrent creation in the same instant, which timestamp ids do not.

use uuid::Uuid;

/// Kind of entity an id names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    Session,
    Message,
    Client,
}

impl IdPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdPrefix::Session => "sess",
            IdPrefix::Message => "msg",
            IdPrefix::Client => "client",
        }
    }
}

/// Generate a fresh identifier for the given entity kind.
pub fn new_id(prefix: IdPrefix) -> String {
    format!("{}_{}", prefix.as_str(), Uuid::new_v4().simple())
}
