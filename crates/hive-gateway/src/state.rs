//! Shared state handed to every connection, method handler and HTTP route.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::debug;

use hive_channels::{ConversationRunner, TurnError};
use hive_core::VERSION;
use hive_session::{Message, SessionStore};

use crate::gateway::GatewaySettings;
use crate::hub::Hub;
use crate::protocol::Frame;

pub struct GatewayState {
    pub store: Arc<SessionStore>,
    pub runner: ConversationRunner,
    pub hub: Hub,
    pub config: GatewaySettings,
    started_at: Instant,
}

impl GatewayState {
    /// Build the state and start the Hub's control loop
    pub fn new(config: GatewaySettings, runner: ConversationRunner) -> Self {
        let hub = Hub::spawn(config.max_connections);
        Self {
            store: Arc::clone(runner.store()),
            runner,
            hub,
            config,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// 健康检查
    pub async fn health(&self) -> Value {
        json!({
            "status": "ok",
            "version": VERSION,
            "uptimeSecs": self.uptime_secs(),
            "connections": self.hub.connection_count().await,
            "sessions": self.store.len(),
        })
    }

    /// Run one conversation turn and tell every peer the session changed
    pub async fn chat_turn(&self, session_id: &str, text: &str) -> Result<Message, TurnError> {
        let reply = self.runner.run_turn(session_id, text).await?;

        let message_count = self
            .store
            .get_messages(session_id)
            .map(|m| m.len())
            .unwrap_or_default();
        let event = Frame::event(
            "session.updated",
            json!({ "sessionId": session_id, "messageCount": message_count }),
        );
        if let Ok(delivered) = self.hub.broadcast_frame(&event).await {
            debug!(session_id, delivered, "session.updated broadcast");
        }

        Ok(reply)
    }
}
