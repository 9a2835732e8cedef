use async_trait::async_trait;
use hive_core::Role;

use crate::chat::{ChatMessage, ChatOptions, ChatResponse, Usage};
use crate::error::Result;
use crate::provider::{LLMProvider, ProviderMetadata};

/// Offline provider that repeats the last user turn. Keeps the gateway
/// usable when no API key is configured.
pub struct EchoProvider {
    metadata: ProviderMetadata,
}

impl EchoProvider {
    pub fn new() -> Self {
        Self {
            metadata: ProviderMetadata {
                id: "echo".to_string(),
                name: "Echo".to_string(),
                default_model: "echo".to_string(),
            },
        }
    }
}

impl Default for EchoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMProvider for EchoProvider {
    fn provider_id(&self) -> &str {
        &self.metadata.id
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn chat(&self, messages: &[ChatMessage], _options: &ChatOptions) -> Result<ChatResponse> {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        Ok(ChatResponse {
            content: format!("Echo: {}", last),
            model: self.metadata.default_model.clone(),
            stop_reason: "end_turn".to_string(),
            usage: Usage::default(),
        })
    }
}
