//! Conversation turns and the pieces chat-platform adapters share.
//!
//! [`ConversationRunner`] is the one place a user message meets the model:
//! the WebSocket `chat.send` method, the HTTP chat endpoint and every
//! [`ChannelAdapter`] go through it.

pub mod adapter;
pub mod allow;
pub mod command;
pub mod error;
pub mod runner;
pub mod split;

pub use adapter::{ChannelAdapter, InboundMessage};
pub use allow::AllowList;
pub use command::ChannelCommand;
pub use error::{Result, TurnError};
pub use runner::ConversationRunner;
pub use split::split_message;
