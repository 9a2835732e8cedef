pub mod message;

pub use message::{ParseRoleError, Role};
