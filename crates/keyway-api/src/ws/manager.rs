use std::collections::HashMap;

use axum::extract::ws::Message;
use keyway_core::types::Timestamp;
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

/// Manages all active WebSocket connections.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(&self, conn_id: String) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID.
    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Broadcast a message to all connected clients.
    ///
    /// Connections whose send channels are closed are silently skipped
    /// (they are cleaned up on their next receive loop iteration).
    pub async fn broadcast(&self, message: Message) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(message.clone());
        }
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Ping frame to every connected client.
    pub async fn ping_all(&self) {
        self.broadcast(Message::Ping(Default::default())).await;
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        if count > 0 {
            tracing::info!(count, "Closed all WebSocket connections");
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_and_remove_track_connection_count() {
        let manager = WsManager::new();
        assert_eq!(manager.connection_count().await, 0);

        let _rx = manager.add("conn-1".to_string()).await;
        assert_eq!(manager.connection_count().await, 1);

        manager.remove("conn-1").await;
        assert_eq!(manager.connection_count().await, 0);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let manager = WsManager::new();
        let mut rx1 = manager.add("conn-1".to_string()).await;
        let mut rx2 = manager.add("conn-2".to_string()).await;

        manager
            .broadcast(Message::Text("hello".to_string().into()))
            .await;

        assert!(matches!(rx1.recv().await, Some(Message::Text(_))));
        assert!(matches!(rx2.recv().await, Some(Message::Text(_))));
    }

    #[tokio::test]
    async fn shutdown_sends_close_and_clears() {
        let manager = WsManager::new();
        let mut rx = manager.add("conn-1".to_string()).await;

        manager.shutdown_all().await;
        assert!(matches!(rx.recv().await, Some(Message::Close(_))));
        assert_eq!(manager.connection_count().await, 0);
    }
}
