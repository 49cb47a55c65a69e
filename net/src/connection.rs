//! Connection table shared by the transports.
//!
//! The table owns its records: callers and sockets hold `Arc` handles that
//! stay valid across unrelated mutations, and removal is by pointer
//! identity so two live connections on the same ports (a transient state
//! during teardown) cannot shadow each other.  Lookups scan linearly; the
//! table holds at most a few dozen entries.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;

use driftos_lib::IrqMutex;

use crate::types::Port;

/// Implemented by connection records so the table can match packets.
pub trait PortPair {
    /// Our (ephemeral) port.
    fn local_port(&self) -> Port;
    /// The peer's port.
    fn remote_port(&self) -> Port;
}

pub struct ConnectionTable<C> {
    connections: IrqMutex<Vec<Arc<C>>>,
}

impl<C: PortPair> ConnectionTable<C> {
    pub const fn new() -> Self {
        Self {
            connections: IrqMutex::new(Vec::new()),
        }
    }

    /// Add a record; the returned handle stays valid until [`remove`](Self::remove).
    pub fn insert(&self, connection: C) -> Arc<C> {
        let connection = Arc::new(connection);
        self.connections.lock().push(connection.clone());
        connection
    }

    /// Remove a record by identity.
    pub fn remove(&self, connection: &Arc<C>) {
        self.connections
            .lock()
            .retain(|c| !Arc::ptr_eq(c, connection));
    }

    /// Find the live connection with the given port pair.
    ///
    /// Decode paths pass the packet's `(target_port, source_port)`: the
    /// remote side's source port is our peer's port.
    pub fn get(&self, local: Port, remote: Port) -> Option<Arc<C>> {
        self.connections
            .lock()
            .iter()
            .find(|c| c.local_port() == local && c.remote_port() == remote)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub(crate) fn clear(&self) {
        self.connections.lock().clear();
    }
}
