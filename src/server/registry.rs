//! The server's authoritative view of its clients.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::protocol::ClientId;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// Client ID → remote address, paired with a last-received timestamp
/// map over the same key set.
///
/// Both maps sit behind shared locks with atomic per-key updates
/// because the transport may hand a delivery context a read while the
/// processing thread mutates. Cloning the registry clones the handles,
/// not the maps.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<RwLock<HashMap<ClientId, SocketAddr>>>,
    last_received: Arc<RwLock<HashMap<ClientId, i64>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, client_id: ClientId, addr: SocketAddr) {
        write(&self.clients).insert(client_id, addr);
    }

    /// Remove a client from both maps. Returns whether it existed.
    pub fn remove(&self, client_id: ClientId) -> bool {
        let existed = write(&self.clients).remove(&client_id).is_some();
        write(&self.last_received).remove(&client_id);
        existed
    }

    pub fn contains(&self, client_id: ClientId) -> bool {
        read(&self.clients).contains_key(&client_id)
    }

    pub fn contains_addr(&self, addr: &SocketAddr) -> bool {
        read(&self.clients).values().any(|a| a == addr)
    }

    pub fn address_of(&self, client_id: ClientId) -> Option<SocketAddr> {
        read(&self.clients).get(&client_id).copied()
    }

    pub fn last_received(&self, client_id: ClientId) -> Option<i64> {
        read(&self.last_received).get(&client_id).copied()
    }

    /// Record traffic from a client.
    pub fn touch(&self, client_id: ClientId, now_ms: i64) {
        write(&self.last_received).insert(client_id, now_ms);
    }

    pub fn len(&self) -> usize {
        read(&self.clients).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.clients).is_empty()
    }

    /// Stable snapshot for fan-out iteration, sorted by client ID so
    /// transmission order is deterministic.
    pub fn snapshot(&self) -> Vec<(ClientId, SocketAddr)> {
        let mut entries: Vec<_> = read(&self.clients)
            .iter()
            .map(|(id, addr)| (*id, *addr))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    /// Clients whose last traffic is older than the threshold.
    pub fn timed_out(&self, now_ms: i64, threshold_ms: i64) -> Vec<ClientId> {
        read(&self.last_received)
            .iter()
            .filter(|(_, &last)| now_ms - last > threshold_ms)
            .map(|(&id, _)| id)
            .collect()
    }
}
