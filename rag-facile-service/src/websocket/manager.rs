//! WebSocket connection manager.
//!
//! Tracks the outbound channel of every open connection.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::messages::ServerMessage;

/// Manager for all WebSocket connections
pub struct WebSocketManager {
    connections: DashMap<String, mpsc::UnboundedSender<ServerMessage>>,
}

impl Default for WebSocketManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub(crate) fn add_connection(
        &self,
        connection_id: String,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        debug!(connection_id = %connection_id, "Adding WebSocket connection");
        self.connections.insert(connection_id, tx);
    }

    pub(crate) fn remove_connection(&self, connection_id: &str) {
        debug!(connection_id = %connection_id, "Removing WebSocket connection");
        self.connections.remove(connection_id);
    }

    /// Send a message to a specific connection. Messages for closed
    /// connections are dropped.
    pub fn send_to(&self, connection_id: &str, msg: ServerMessage) {
        if let Some(tx) = self.connections.get(connection_id)
            && tx.send(msg).is_err()
        {
            warn!(connection_id = %connection_id, "Failed to send message to connection");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
