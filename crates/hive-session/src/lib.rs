//! # Hive Session Store
//!
//! Owns all conversation state: sessions, their append-only message
//! history and metadata. Pure data plus concurrency-safe CRUD; nothing here
//! knows about the network.
//!
//! ```rust,no_run
//! use hive_core::Role;
//! use hive_session::SessionStore;
//!
//! let store = SessionStore::new();
//! let session = store.create("My Chat");
//! store.add_message(&session.id, Role::User, "Hello!")?;
//! assert_eq!(store.get_messages(&session.id)?.len(), 1);
//! # Ok::<(), hive_session::SessionError>(())
//! ```

pub mod error;
pub mod store;
pub mod types;

pub use error::{SessionError, SessionResult};
pub use store::{SessionStore, SessionStoreConfig};
pub use types::{Message, Session, SessionSummary};
