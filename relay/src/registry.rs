//! Hostname routing table.
//!
//! Maps a normalized hostname to the one endpoint currently serving
//! it. Registering over an existing entry evicts the prior endpoint:
//! the map entry is swapped under the lock and the evicted endpoint is
//! closed outside it, since closing wakes pending waiters.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::endpoint::TunnelEndpoint;

/// Lowercases and trims a hostname into its routing-key form.
pub fn normalize_hostname(hostname: &str) -> String {
    hostname.trim().to_ascii_lowercase()
}

/// In-memory hostname -> endpoint map. Process-wide, no persistence.
pub struct Registry {
    tunnels: RwLock<HashMap<String, Arc<dyn TunnelEndpoint>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            tunnels: RwLock::new(HashMap::new()),
        }
    }

    /// Installs the endpoint for a hostname, closing any prior owner.
    pub fn register(&self, hostname: &str, endpoint: Arc<dyn TunnelEndpoint>) {
        let key = normalize_hostname(hostname);
        let evicted = {
            let mut tunnels = self.tunnels.write().expect("registry lock");
            tunnels.insert(key, endpoint)
        };
        if let Some(old) = evicted {
            old.close();
        }
    }

    /// Closes and removes the endpoint for a hostname, if any.
    pub fn unregister(&self, hostname: &str) {
        let removed = {
            let mut tunnels = self.tunnels.write().expect("registry lock");
            tunnels.remove(&normalize_hostname(hostname))
        };
        if let Some(endpoint) = removed {
            endpoint.close();
        }
    }

    /// Removes the entry for a hostname only while it still points at
    /// the given endpoint. Keeps a stream's teardown from tearing down
    /// the endpoint that evicted it.
    pub fn unregister_endpoint(&self, hostname: &str, endpoint: &Arc<dyn TunnelEndpoint>) {
        let key = normalize_hostname(hostname);
        let removed = {
            let mut tunnels = self.tunnels.write().expect("registry lock");
            match tunnels.get(&key) {
                Some(current) if Arc::ptr_eq(current, endpoint) => tunnels.remove(&key),
                _ => None,
            }
        };
        if let Some(endpoint) = removed {
            endpoint.close();
        }
    }

    /// Returns the current endpoint for a hostname. The handle is only
    /// valid for the request at hand; a concurrent eviction makes
    /// later dispatches on it fail closed.
    pub fn lookup(&self, hostname: &str) -> Option<Arc<dyn TunnelEndpoint>> {
        let tunnels = self.tunnels.read().expect("registry lock");
        tunnels.get(&normalize_hostname(hostname)).cloned()
    }

    /// Snapshot of hostname -> client peer address.
    pub fn list(&self) -> HashMap<String, String> {
        let tunnels = self.tunnels.read().expect("registry lock");
        tunnels
            .iter()
            .map(|(hostname, endpoint)| (hostname.clone(), endpoint.peer_addr()))
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
