//! Live connections keyed by id.
//!
//! Iteration always happens over a snapshot: values are cloned out under a
//! short read lock and the lock is released before any I/O. Connections
//! inserted while a fan-out is running are therefore not visited by it,
//! and removals found during a sweep are applied afterwards under a single
//! write lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::ConnectionId;
use crate::ws::Connection;

/// Set of connections owned by the bus.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection.
    pub async fn insert(&self, connection: Arc<Connection>) {
        let id = connection.id();
        self.connections.write().await.insert(id, connection);
    }

    /// Removes a connection, returning it if it was registered.
    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.write().await.remove(&id)
    }

    /// Looks up a connection.
    pub async fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().await.get(&id).map(Arc::clone)
    }

    /// Point-in-time copy of every registered connection.
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.values().map(Arc::clone).collect()
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns `true` if no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Closes and removes every connection that is no longer valid.
    ///
    /// Connections whose transport already failed are removed without a
    /// close attempt; close failures (e.g. already closed) are ignored.
    /// Returns the number of removed connections.
    pub async fn purge(&self) -> usize {
        let mut stale = Vec::new();
        for connection in self.snapshot().await {
            if connection.is_valid() {
                continue;
            }
            if !connection.is_disconnected()
                && let Err(e) = connection.close().await
            {
                tracing::trace!(conn_id = %connection.id(), error = %e, "close during purge failed");
            }
            stale.push(connection.id());
        }
        if stale.is_empty() {
            return 0;
        }

        let mut map = self.connections.write().await;
        let removed = stale.iter().filter(|id| map.remove(*id).is_some()).count();
        tracing::debug!(removed, remaining = map.len(), "purged stale connections");
        removed
    }
}
