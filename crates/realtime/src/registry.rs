//! Connection registry keyed by generated id.

use crate::connection::{Connection, ConnectionId};
use authz::Identity;
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

/// Live connections.
///
/// Fan-out iterates a copied snapshot of the set, and removal happens before
/// a connection is marked closed, so a removed connection never receives an
/// event it was not already offered.
#[derive(Default)]
pub struct Registry {
    next_id: AtomicU64,
    connections: RwLock<BTreeMap<ConnectionId, Arc<Connection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id and insert a new connection.
    pub fn insert(&self, identity: Identity, capacity: usize) -> Arc<Connection> {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let conn = Arc::new(Connection::new(id, identity, capacity));
        self.connections.write().insert(id, Arc::clone(&conn));
        conn
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.write().remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(&id).cloned()
    }

    /// Copy of the live set, safe to iterate while connections come and go.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}
