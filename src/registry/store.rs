//! Client registry implementation
//!
//! The central synchronized map of registered connections. All mutation goes
//! through this API; callers never need external locking.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::client::{ClientEntry, ClientId};
use super::error::RegistryError;

/// Central registry of all registered clients
///
/// Thread-safe via `RwLock`. Critical sections are bounded: `snapshot`
/// collects under the read lock and releases before any delivery happens,
/// so a send to a slow client never holds the map.
pub struct ClientRegistry {
    /// Map of client id to entry
    clients: RwLock<HashMap<ClientId, Arc<ClientEntry>>>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register a client entry
    ///
    /// Fails if the identifier is already present. Identifiers are minted
    /// from a process-wide counter, so a duplicate indicates a caller bug;
    /// the accept path treats it as fatal for that attempt and retries with
    /// a fresh identifier.
    pub async fn register(&self, entry: Arc<ClientEntry>) -> Result<(), RegistryError> {
        let mut clients = self.clients.write().await;

        let id = entry.id();
        if clients.contains_key(&id) {
            return Err(RegistryError::DuplicateIdentifier(id));
        }

        clients.insert(id, entry);
        tracing::debug!(client = %id, total = clients.len(), "Client registered");

        Ok(())
    }

    /// Remove a client entry
    ///
    /// Idempotent: removing an absent identifier is a no-op, so concurrent
    /// teardown from the read loop and the liveness monitor is safe.
    /// Returns whether an entry was removed.
    pub async fn unregister(&self, id: ClientId) -> bool {
        let mut clients = self.clients.write().await;

        let removed = clients.remove(&id).is_some();
        if removed {
            tracing::debug!(client = %id, total = clients.len(), "Client unregistered");
        }

        removed
    }

    /// Look up a client by identifier
    pub async fn get(&self, id: ClientId) -> Option<Arc<ClientEntry>> {
        self.clients.read().await.get(&id).cloned()
    }

    /// Point-in-time view of all registered clients, ordered by identifier
    ///
    /// The returned entries stay valid after a concurrent unregister; a
    /// delivery to an entry mid-teardown fails at its closed queue instead
    /// of touching a dead transport.
    pub async fn snapshot(&self) -> Vec<Arc<ClientEntry>> {
        let mut entries: Vec<Arc<ClientEntry>> =
            self.clients.read().await.values().cloned().collect();
        entries.sort_by_key(|e| e.id());
        entries
    }

    /// Number of registered clients
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Force-close and remove every registered client
    ///
    /// Shutdown path: cancels each entry's connection task and clears the
    /// map. Returns the number of clients that were registered.
    pub async fn clear_and_close(&self) -> usize {
        let mut clients = self.clients.write().await;

        let count = clients.len();
        for entry in clients.values() {
            entry.force_close();
        }
        clients.clear();

        if count > 0 {
            tracing::info!(clients = count, "Registry cleared");
        }

        count
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::client::OutboundFrame;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn entry(id: u64) -> (Arc<ClientEntry>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(8);
        let (ping_tx, _ping_rx) = mpsc::channel(1);
        let entry = ClientEntry::new(
            ClientId::new(id),
            "127.0.0.1:9000".parse().unwrap(),
            tx,
            ping_tx,
            CancellationToken::new(),
        );
        (Arc::new(entry), rx)
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = ClientRegistry::new();
        let (e, _rx) = entry(1);

        registry.register(e).await.unwrap();

        assert_eq!(registry.len().await, 1);
        let found = registry.get(ClientId::new(1)).await.unwrap();
        assert_eq!(found.id(), ClientId::new(1));
    }

    #[tokio::test]
    async fn test_register_duplicate_rejected() {
        let registry = ClientRegistry::new();
        let (a, _rx_a) = entry(1);
        let (b, _rx_b) = entry(1);

        registry.register(a).await.unwrap();
        let result = registry.register(b).await;

        assert!(matches!(
            result,
            Err(RegistryError::DuplicateIdentifier(id)) if id == ClientId::new(1)
        ));
        // Never two live entries for one identifier
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_idempotent() {
        let registry = ClientRegistry::new();
        let (e, _rx) = entry(1);

        registry.register(e).await.unwrap();

        assert!(registry.unregister(ClientId::new(1)).await);
        assert!(!registry.unregister(ClientId::new(1)).await);
        assert!(registry.get(ClientId::new(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_ordered_and_stable() {
        let registry = ClientRegistry::new();
        let (a, _rx_a) = entry(3);
        let (b, _rx_b) = entry(1);
        let (c, _rx_c) = entry(2);

        registry.register(a).await.unwrap();
        registry.register(b).await.unwrap();
        registry.register(c).await.unwrap();

        let snap = registry.snapshot().await;
        let ids: Vec<u64> = snap.iter().map(|e| e.id().as_u64()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        // Entries from the snapshot survive a concurrent unregister
        registry.unregister(ClientId::new(2)).await;
        assert_eq!(snap.len(), 3);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_clear_and_close_cancels_entries() {
        let registry = ClientRegistry::new();
        let (a, _rx_a) = entry(1);
        let (b, _rx_b) = entry(2);
        let a_ref = Arc::clone(&a);

        registry.register(a).await.unwrap();
        registry.register(b).await.unwrap();

        assert_eq!(registry.clear_and_close().await, 2);
        assert!(registry.is_empty().await);
        assert!(a_ref.is_closing());
    }
}
