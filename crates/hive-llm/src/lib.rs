//! Language-model collaborator contract and provider clients.
//!
//! The gateway only sees [`LLMProvider`]: an ordered conversation plus
//! [`ChatOptions`] in, a [`ChatResponse`] out. Concrete clients are thin,
//! stateless HTTP wrappers.

pub mod chat;
pub mod error;
pub mod provider;
pub mod providers;

pub use chat::{ChatMessage, ChatOptions, ChatResponse, StreamChunk, Usage};
pub use error::{LLMError, Result};
pub use provider::{LLMProvider, LLMStream, ProviderConfig, ProviderMetadata};
pub use providers::{AnthropicProvider, EchoProvider, OpenRouterProvider};
