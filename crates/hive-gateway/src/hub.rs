//! Connection registry and broadcast fan-out.
//!
//! The registry lives inside a single control task; every registration,
//! deregistration and broadcast is a command on its queue, so the set is
//! never observed half-updated.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::connection::ConnectionHandle;
use crate::protocol::Frame;

const COMMAND_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("hub is at capacity ({0} connections)")]
    AtCapacity(usize),
    #[error("connection {0} is already registered")]
    Duplicate(String),
    #[error("hub has stopped")]
    Stopped,
}

enum Command {
    Register {
        conn: ConnectionHandle,
        ack: oneshot::Sender<Result<(), HubError>>,
    },
    Unregister {
        conn_id: String,
        ack: oneshot::Sender<bool>,
    },
    Broadcast {
        frame: Arc<str>,
        ack: oneshot::Sender<usize>,
    },
    Count {
        ack: oneshot::Sender<usize>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Handle to the Hub's control loop. Clones share the same registry.
#[derive(Debug, Clone)]
pub struct Hub {
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Register { .. } => "Register",
            Command::Unregister { .. } => "Unregister",
            Command::Broadcast { .. } => "Broadcast",
            Command::Count { .. } => "Count",
            Command::Shutdown { .. } => "Shutdown",
        };
        f.write_str(name)
    }
}

impl Hub {
    /// Start the control loop on the current runtime
    pub fn spawn(max_connections: usize) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(run(rx, max_connections));
        Self { commands }
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, HubError> {
        let (ack, rx) = oneshot::channel();
        self.commands
            .send(make(ack))
            .await
            .map_err(|_| HubError::Stopped)?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    /// Add a connection to the live set. Effective once this returns.
    pub async fn register(&self, conn: ConnectionHandle) -> Result<(), HubError> {
        self.call(|ack| Command::Register { conn, ack }).await?
    }

    /// Remove a connection and close it. Returns whether it was live;
    /// repeating the call is a no-op.
    pub async fn unregister(&self, conn_id: &str) -> bool {
        let conn_id = conn_id.to_string();
        self.call(|ack| Command::Unregister { conn_id, ack })
            .await
            .unwrap_or(false)
    }

    /// Deliver the same bytes to every live connection. Connections whose
    /// queue is full or closed are dropped instead of waited on. Returns
    /// the number of connections that received the frame.
    pub async fn broadcast(&self, frame: Arc<str>) -> Result<usize, HubError> {
        self.call(|ack| Command::Broadcast { frame, ack }).await
    }

    pub async fn broadcast_frame(&self, frame: &Frame) -> Result<usize, HubError> {
        match frame.encode() {
            Ok(text) => self.broadcast(Arc::from(text)).await,
            Err(e) => {
                warn!(error = %e, "not broadcasting unencodable frame");
                Ok(0)
            }
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.call(|ack| Command::Count { ack }).await.unwrap_or(0)
    }

    /// Close every connection and stop the control loop
    pub async fn shutdown(&self) {
        let _ = self.call(|ack| Command::Shutdown { ack }).await;
    }
}

async fn run(mut commands: mpsc::Receiver<Command>, max_connections: usize) {
    let mut registry: HashMap<String, ConnectionHandle> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Register { conn, ack } => {
                let result = if registry.len() >= max_connections {
                    Err(HubError::AtCapacity(max_connections))
                } else if registry.contains_key(conn.id()) {
                    Err(HubError::Duplicate(conn.id().to_string()))
                } else {
                    debug!(conn_id = %conn.id(), total = registry.len() + 1, "registered");
                    registry.insert(conn.id().to_string(), conn);
                    Ok(())
                };
                let _ = ack.send(result);
            }
            Command::Unregister { conn_id, ack } => {
                let removed = match registry.remove(&conn_id) {
                    Some(conn) => {
                        conn.close();
                        debug!(conn_id = %conn_id, total = registry.len(), "unregistered");
                        true
                    }
                    None => false,
                };
                let _ = ack.send(removed);
            }
            Command::Broadcast { frame, ack } => {
                let mut delivered = 0;
                let mut dropped = Vec::new();
                for (id, conn) in &registry {
                    match conn.try_enqueue(Arc::clone(&frame)) {
                        Ok(()) => delivered += 1,
                        Err(reason) => {
                            warn!(conn_id = %id, %reason, "dropping slow consumer");
                            dropped.push(id.clone());
                        }
                    }
                }
                for id in dropped {
                    if let Some(conn) = registry.remove(&id) {
                        conn.close();
                    }
                }
                let _ = ack.send(delivered);
            }
            Command::Count { ack } => {
                let _ = ack.send(registry.len());
            }
            Command::Shutdown { ack } => {
                info!(connections = registry.len(), "hub shutting down");
                for (_, conn) in registry.drain() {
                    conn.close();
                }
                let _ = ack.send(());
                return;
            }
        }
    }

    // every handle dropped
    for (_, conn) in registry.drain() {
        conn.close();
    }
}
