use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::chat::{ChatMessage, ChatOptions, ChatResponse, StreamChunk};
use crate::error::Result;

/// Type alias for LLM stream. Finite and not restartable.
pub type LLMStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// LLM Provider trait
///
/// The narrow contract the gateway consumes: an ordered conversation goes
/// in, one reply comes out.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Get the provider ID
    fn provider_id(&self) -> &str;

    /// Get provider metadata
    fn metadata(&self) -> &ProviderMetadata;

    /// Send a conversation and get a complete response
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse>;

    /// Send a conversation and stream the response.
    ///
    /// The default falls back to [`LLMProvider::chat`] and yields the whole
    /// reply as one chunk followed by [`StreamChunk::Done`].
    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<LLMStream> {
        let items = match self.chat(messages, options).await {
            Ok(response) => vec![Ok(StreamChunk::Content(response.content)), Ok(StreamChunk::Done)],
            Err(e) => vec![Err(e)],
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// Provider metadata
#[derive(Debug, Clone)]
pub struct ProviderMetadata {
    /// Provider ID
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Model used when the caller does not pick one
    pub default_model: String,
}
