// Process-wide registry of live clients.
//
// Clients register on construction and deregister when the last handle is
// dropped. Entries are weak, so the registry never keeps a client alive.

use std::sync::{Arc, LazyLock, Weak};

use dashmap::DashMap;
use tracing::debug;

use crate::client::{Client, ClientInner};

static CLIENTS: LazyLock<DashMap<u64, Weak<ClientInner>>> = LazyLock::new(DashMap::new);

pub(crate) fn register(inner: &Arc<ClientInner>) {
    CLIENTS.insert(inner.id(), Arc::downgrade(inner));
}

pub(crate) fn deregister(id: u64) {
    CLIENTS.remove(&id);
}

/// Every client that is still alive.
pub fn live_clients() -> Vec<Client> {
    CLIENTS
        .iter()
        .filter_map(|entry| entry.value().upgrade())
        .map(Client::from_inner)
        .collect()
}

/// Stop every live client.
pub fn stop_all() {
    let clients = live_clients();
    debug!(count = clients.len(), "stopping all clients");
    for client in &clients {
        client.stop();
    }
}
