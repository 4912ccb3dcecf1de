//! Client registry
//!
//! Caches transport clients keyed by endpoint identity so repeated calls
//! reuse connections and TLS setup instead of reconstructing them per call.
//! Entries live for the process lifetime and are never evicted.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use forge_core::domain::runner::RunnerIdentity;

use crate::error::Result;
use crate::transport::TransportClient;

/// Concurrency-safe cache of transport clients
///
/// Lookups of cached entries share the read lock; a cache miss takes the
/// write lock and re-checks before constructing, so concurrent first use of
/// the same key builds exactly one transport.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, Arc<TransportClient>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached transport for this identity, constructing it on
    /// first use
    ///
    /// Construction may fail when the identity's trust bundle cannot be
    /// loaded; the failure is not cached, so a later call can retry.
    pub fn obtain(&self, identity: &RunnerIdentity) -> Result<Arc<TransportClient>> {
        let key = identity.registry_key();

        if let Some(client) = self.clients.read().unwrap().get(&key) {
            return Ok(Arc::clone(client));
        }

        let mut clients = self.clients.write().unwrap();
        if let Some(client) = clients.get(&key) {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(TransportClient::new(identity)?);
        clients.insert(key, Arc::clone(&client));
        Ok(client)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.clients.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_identity_returns_same_transport() {
        let registry = ClientRegistry::new();
        let identity = RunnerIdentity::new("http://localhost:8080", "token");

        let first = registry.obtain(&identity).unwrap();
        let second = registry.obtain(&identity).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_token_does_not_split_the_cache() {
        let registry = ClientRegistry::new();
        let a = RunnerIdentity::new("http://localhost:8080", "token-a");
        let b = RunnerIdentity::new("http://localhost:8080", "token-b");

        let first = registry.obtain(&a).unwrap();
        let second = registry.obtain(&b).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_distinct_endpoints_get_distinct_transports() {
        let registry = ClientRegistry::new();
        let a = RunnerIdentity::new("http://localhost:8080", "token");
        let b = RunnerIdentity::new("http://localhost:9090", "token");

        let first = registry.obtain(&a).unwrap();
        let second = registry.obtain(&b).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_construction_failure_is_not_cached() {
        let registry = ClientRegistry::new();
        let mut identity = RunnerIdentity::new("http://localhost:8080", "token");
        identity.tls_ca_file = Some("/nonexistent/ca.pem".into());

        assert!(registry.obtain(&identity).is_err());
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_constructs_exactly_once() {
        let registry = Arc::new(ClientRegistry::new());
        let identity = RunnerIdentity::new("http://localhost:8080", "token");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let identity = identity.clone();
            handles.push(tokio::spawn(async move {
                registry.obtain(&identity).unwrap()
            }));
        }

        let mut clients = Vec::new();
        for handle in handles {
            clients.push(handle.await.unwrap());
        }

        for client in &clients[1..] {
            assert!(Arc::ptr_eq(&clients[0], client));
        }
        assert_eq!(registry.len(), 1);
    }
}
