use hive_core::Role;
use hive_llm::{ChatMessage, ChatOptions, LLMProvider};
use hive_session::{Message, SessionStore};
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::error::{Result, TurnError};

/// Runs one user turn against a session: record the user message, ask the
/// provider with the full history, record the reply.
#[derive(Clone)]
pub struct ConversationRunner {
    store: Arc<SessionStore>,
    provider: Arc<dyn LLMProvider>,
    options: ChatOptions,
}

impl ConversationRunner {
    pub fn new(store: Arc<SessionStore>, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            store,
            provider,
            options: ChatOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    /// Returns the assistant message that was appended.
    ///
    /// On provider failure the user message stays recorded and nothing else
    /// is appended.
    #[instrument(skip(self, text), fields(provider = %self.provider.provider_id()))]
    pub async fn run_turn(&self, session_id: &str, text: &str) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        self.store.add_message(session_id, Role::User, text)?;

        let history: Vec<ChatMessage> = self
            .store
            .get_messages(session_id)?
            .into_iter()
            .map(|m| ChatMessage::new(m.role, m.content))
            .collect();
        debug!(turns = history.len(), "calling provider");

        let response = match self.provider.chat(&history, &self.options).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "provider call failed");
                return Err(e.into());
            }
        };

        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "provider replied"
        );

        Ok(self
            .store
            .add_message(session_id, Role::Assistant, response.content)?)
    }
}
