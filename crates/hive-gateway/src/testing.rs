use std::sync::Arc;

use async_trait::async_trait;
use hive_channels::ConversationRunner;
use hive_llm::{
    ChatMessage, ChatOptions, ChatResponse, EchoProvider, LLMError, LLMProvider, ProviderMetadata,
};
use hive_session::SessionStore;

use crate::gateway::GatewaySettings;
use crate::methods::MethodRegistry;
use crate::state::GatewayState;

struct DownProvider {
    metadata: ProviderMetadata,
}

#[async_trait]
impl LLMProvider for DownProvider {
    fn provider_id(&self) -> &str {
        &self.metadata.id
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn chat(&self, _messages: &[ChatMessage], _options: &ChatOptions) -> hive_llm::Result<ChatResponse> {
        Err(LLMError::Network("connection refused".to_string()))
    }
}

/// Fresh state backed by the echo provider
pub(crate) fn test_state() -> (Arc<GatewayState>, Arc<MethodRegistry>) {
    test_state_with(false)
}

pub(crate) fn test_state_with(provider_down: bool) -> (Arc<GatewayState>, Arc<MethodRegistry>) {
    let provider: Arc<dyn LLMProvider> = if provider_down {
        Arc::new(DownProvider {
            metadata: ProviderMetadata {
                id: "down".to_string(),
                name: "Down".to_string(),
                default_model: "none".to_string(),
            },
        })
    } else {
        Arc::new(EchoProvider::new())
    };
    let runner = ConversationRunner::new(Arc::new(SessionStore::new()), provider);
    let state = GatewayState::new(GatewaySettings::default(), runner);
    (Arc::new(state), Arc::new(MethodRegistry::new()))
}
