use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::allow::AllowList;
use crate::command::{ChannelCommand, HELP_TEXT};
use crate::error::TurnError;
use crate::runner::ConversationRunner;
use crate::split::split_message;

pub const APOLOGY_TEXT: &str = "Sorry, I encountered an error. Please try again.";

/// A message as it arrives from a chat platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub user_id: String,
    pub chat_id: String,
    pub text: String,
}

impl InboundMessage {
    pub fn new(
        user_id: impl Into<String>,
        chat_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            chat_id: chat_id.into(),
            text: text.into(),
        }
    }
}

/// The shared half of a chat-platform integration.
///
/// A platform client supplies the transport; the default methods do the
/// rest: access control, one session per chat, commands, the model turn and
/// splitting the reply for the platform's size cap.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Short platform tag, used as the session key prefix (`tg`, `discord`)
    fn channel_id(&self) -> &str;

    fn runner(&self) -> &ConversationRunner;

    fn allow_list(&self) -> &AllowList;

    fn command_prefix(&self) -> &str {
        "/"
    }

    /// Platform message size cap in bytes
    fn max_message_len(&self) -> usize {
        4096
    }

    /// One session per chat, so group chats share a conversation
    fn session_key(&self, chat_id: &str) -> String {
        format!("{}_{}", self.channel_id(), chat_id)
    }

    /// Process one inbound message and return the texts to send back.
    /// Senders outside the allow-list get no reply at all.
    async fn handle_inbound(&self, inbound: &InboundMessage) -> Vec<String> {
        if !self.allow_list().permits(&inbound.user_id, &inbound.chat_id) {
            warn!(
                channel = %self.channel_id(),
                user_id = %inbound.user_id,
                chat_id = %inbound.chat_id,
                "unauthorized access attempt"
            );
            return Vec::new();
        }

        let key = self.session_key(&inbound.chat_id);
        let store = self.runner().store();

        let reply = match ChannelCommand::parse(&inbound.text, self.command_prefix()) {
            Some(ChannelCommand::New) => {
                store.delete(&key);
                store.get_or_create(&key, &key);
                info!(session_id = %key, "started new conversation");
                "Started a new conversation.".to_string()
            }
            Some(ChannelCommand::Clear) => {
                store.get_or_create(&key, &key);
                match store.clear(&key) {
                    Ok(()) => "Conversation cleared.".to_string(),
                    Err(_) => APOLOGY_TEXT.to_string(),
                }
            }
            Some(ChannelCommand::Help) => HELP_TEXT.to_string(),
            Some(ChannelCommand::Unknown(_)) => {
                format!("Unknown command. Try {}help", self.command_prefix())
            }
            None => {
                store.get_or_create(&key, &key);
                match self.runner().run_turn(&key, &inbound.text).await {
                    Ok(message) => message.content,
                    Err(TurnError::EmptyMessage) => return Vec::new(),
                    Err(e) => {
                        warn!(session_id = %key, error = %e, "turn failed");
                        APOLOGY_TEXT.to_string()
                    }
                }
            }
        };

        split_message(&reply, self.max_message_len())
    }
}
