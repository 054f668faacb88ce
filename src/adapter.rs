//! The normalized client surface over the two native capabilities.
//!
//! `CacheClientAdapter` owns exactly one native client, chosen by the
//! capability at construction and created on first use. Every operation
//! returns a plain value: failures are logged and reported as `false` or a
//! miss, never as an error.

use std::fmt;
use std::sync::{Once, OnceLock};

use bytes::Bytes;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::client::{Connector, LegacyClient, NetworkConnector, SuccessorClient};
use crate::config::Capability;
use crate::error::{CacheError, CacheResult};
use crate::pool::{ServerDescriptor, ServerPool};

/// Flags word sent with legacy writes.
const LEGACY_FLAGS: u32 = 0;

/// Delay sent with legacy deletes.
const LEGACY_DELETE_DELAY: u32 = 0;

/// The native client an adapter owns.
pub enum ClientHandle<C: Connector> {
    Memcache(C::Legacy),
    Memcached(C::Successor),
}

impl<C: Connector> ClientHandle<C> {
    /// The capability of the wrapped client.
    pub fn capability(&self) -> Capability {
        match self {
            ClientHandle::Memcache(_) => Capability::Memcache,
            ClientHandle::Memcached(_) => Capability::Memcached,
        }
    }
}

impl<C: Connector> fmt::Debug for ClientHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClientHandle")
            .field(&self.capability())
            .finish()
    }
}

/// Lazily created, single-capability cache client.
pub struct CacheClientAdapter<C: Connector = NetworkConnector> {
    capability: Capability,
    connector: C,
    handle: OnceLock<ClientHandle<C>>,
    registration: Once,
}

impl<C: Connector> fmt::Debug for CacheClientAdapter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheClientAdapter")
            .field("capability", &self.capability)
            .field("created", &self.is_created())
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl CacheClientAdapter<NetworkConnector> {
    /// Create an adapter that talks to real memcached nodes.
    pub fn new(capability: Capability) -> Self {
        Self::with_connector(capability, NetworkConnector)
    }
}

impl<C: Connector> CacheClientAdapter<C> {
    /// Create an adapter whose native client comes from `connector`.
    pub fn with_connector(capability: Capability, connector: C) -> Self {
        Self {
            capability,
            connector,
            handle: OnceLock::new(),
            registration: Once::new(),
        }
    }

    /// The capability fixed at construction.
    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// The native client, created on the first call.
    pub fn instance(&self) -> &ClientHandle<C> {
        self.handle.get_or_init(|| {
            debug!(capability = %self.capability, "creating cache client");
            match self.capability {
                Capability::Memcache => ClientHandle::Memcache(self.connector.legacy()),
                Capability::Memcached => ClientHandle::Memcached(self.connector.successor()),
            }
        })
    }

    /// Whether the native client has been created.
    pub fn is_created(&self) -> bool {
        self.handle.get().is_some()
    }

    /// Whether `register_servers` has run.
    pub fn is_registered(&self) -> bool {
        self.registration.is_completed()
    }

    /// Register the pool with the native client.
    ///
    /// An empty pool registers the default `localhost:11211` node. Runs at
    /// most once per adapter; later calls return `false` and register
    /// nothing.
    pub fn register_servers(&self, pool: &ServerPool) -> bool {
        let mut registered = false;
        self.registration.call_once(|| {
            let fallback;
            let servers = if pool.is_empty() {
                fallback = [ServerDescriptor::default_node()];
                &fallback[..]
            } else {
                pool.current()
            };

            let handle = self.instance();
            for server in servers {
                let accepted = match handle {
                    ClientHandle::Memcached(client) => {
                        client.add_server(&server.host, server.port, server.weight)
                    }
                    ClientHandle::Memcache(client) => client.add_server(
                        &server.host,
                        server.port,
                        server.persistent,
                        server.weight,
                        server.timeout,
                        server.retry_interval,
                        server.status,
                    ),
                };
                if accepted {
                    debug!(capability = %self.capability, server = %server, "server registered");
                } else {
                    warn!(capability = %self.capability, server = %server, "server rejected by client");
                }
            }
            registered = true;
        });

        if !registered {
            debug!(capability = %self.capability, "servers already registered, skipping");
        }
        registered
    }

    /// Fetch one key. `None` on a miss or a failure.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let result = match self.instance() {
            ClientHandle::Memcached(client) => client.get(key).await,
            ClientHandle::Memcache(client) => client.get(&[key]).await.map(|mut found| found.remove(key)),
        };
        match result {
            Ok(Some(value)) => {
                debug!(key = %key, "cache hit");
                Some(value)
            }
            Ok(None) => {
                debug!(key = %key, "cache miss");
                None
            }
            Err(e) => {
                warn!(capability = %self.capability, key = %key, error = %e, "cache get failed");
                None
            }
        }
    }

    /// Fetch several keys. Missing keys are omitted; the result follows the
    /// order of `keys`.
    pub async fn get_multi(&self, keys: &[&str]) -> IndexMap<String, Bytes> {
        if keys.is_empty() {
            return IndexMap::new();
        }
        let result = match self.instance() {
            ClientHandle::Memcached(client) => client.get_multi(keys).await,
            ClientHandle::Memcache(client) => client.get(keys).await,
        };
        match result {
            Ok(mut found) => keys
                .iter()
                .filter_map(|key| found.remove(*key).map(|value| ((*key).to_string(), value)))
                .collect(),
            Err(e) => {
                warn!(capability = %self.capability, keys = keys.len(), error = %e, "cache get_multi failed");
                IndexMap::new()
            }
        }
    }

    /// Store a value with an absolute expiry, `0` for never.
    pub async fn set(&self, key: &str, value: &[u8], expiry: u32) -> bool {
        let result = match self.instance() {
            ClientHandle::Memcached(client) => client.set(key, value, expiry).await,
            ClientHandle::Memcache(client) => client.set(key, value, LEGACY_FLAGS, expiry).await,
        };
        self.report("set", key, result)
    }

    /// Store only if absent. `false` when the key exists or the write failed.
    pub async fn add(&self, key: &str, value: &[u8], expiry: u32) -> bool {
        let result = match self.instance() {
            ClientHandle::Memcached(client) => client.add(key, value, expiry).await,
            ClientHandle::Memcache(client) => client.add(key, value, LEGACY_FLAGS, expiry).await,
        };
        self.report("add", key, result)
    }

    /// Delete a key. `false` when it was absent or the delete failed.
    pub async fn delete(&self, key: &str) -> bool {
        let result = match self.instance() {
            ClientHandle::Memcached(client) => client.delete(key).await,
            ClientHandle::Memcache(client) => client.delete(key, LEGACY_DELETE_DELAY).await,
        };
        self.report("delete", key, result)
    }

    /// Remove every value from every node.
    pub async fn flush(&self) -> bool {
        let result = match self.instance() {
            ClientHandle::Memcached(client) => client.flush().await,
            ClientHandle::Memcache(client) => client.flush().await,
        };
        self.report("flush", "*", result)
    }

    fn report(&self, op: &'static str, key: &str, result: CacheResult<()>) -> bool {
        match result {
            Ok(()) => {
                debug!(op, key = %key, "cache write ok");
                true
            }
            Err(e @ CacheError::Backend(_)) => {
                debug!(op, key = %key, error = %e, "cache write refused");
                false
            }
            Err(e) => {
                warn!(capability = %self.capability, op, key = %key, error = %e, "cache write failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConnector, Registration};

    fn adapter(capability: Capability) -> (CacheClientAdapter<MemoryConnector>, MemoryConnector) {
        let connector = MemoryConnector::new();
        (
            CacheClientAdapter::with_connector(capability, connector.clone()),
            connector,
        )
    }

    #[test]
    fn test_instance_is_lazy_and_reused() {
        let (adapter, connector) = adapter(Capability::Memcached);
        assert!(!adapter.is_created());
        assert_eq!(connector.store().clients_created(), 0);

        let first = adapter.instance() as *const _;
        let second = adapter.instance() as *const _;
        assert_eq!(first, second);
        assert_eq!(connector.store().clients_created(), 1);
        assert_eq!(adapter.instance().capability(), Capability::Memcached);
    }

    #[test]
    fn test_empty_pool_registers_default_node() {
        let (adapter, connector) = adapter(Capability::Memcached);
        assert!(adapter.register_servers(&ServerPool::default()));

        let registrations = connector.store().registrations();
        assert_eq!(
            registrations,
            vec![Registration::Successor {
                host: "localhost".to_string(),
                port: 11211,
                weight: 1,
            }]
        );
    }

    #[test]
    fn test_registration_runs_once() {
        let (adapter, connector) = adapter(Capability::Memcache);
        let pool = ServerPool::new(vec![ServerDescriptor::new("a", 11211).unwrap()]);
        assert!(adapter.register_servers(&pool));
        assert!(!adapter.register_servers(&pool));
        assert!(adapter.is_registered());
        assert_eq!(connector.store().registrations().len(), 1);
    }

    #[test]
    fn test_legacy_registration_uses_every_field() {
        let (adapter, connector) = adapter(Capability::Memcache);
        let mut server = ServerDescriptor::new("legacy", 11212).unwrap();
        server.persistent = true;
        server.timeout = 3;
        server.retry_interval = -1;
        server.status = false;
        adapter.register_servers(&ServerPool::new(vec![server]));

        assert_eq!(
            connector.store().registrations(),
            vec![Registration::Legacy {
                host: "legacy".to_string(),
                port: 11212,
                persistent: true,
                weight: 1,
                timeout: 3,
                retry_interval: -1,
                status: false,
            }]
        );
    }

    #[tokio::test]
    async fn test_legacy_get_multi_returns_mapping() {
        let (adapter, _connector) = adapter(Capability::Memcache);
        adapter.register_servers(&ServerPool::default());

        assert!(adapter.set("b", b"2", 0).await);
        assert!(adapter.set("a", b"1", 0).await);

        let found = adapter.get_multi(&["a", "missing", "b"]).await;
        let keys: Vec<_> = found.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(found["a"], Bytes::from("1"));
    }

    #[tokio::test]
    async fn test_failures_become_false_and_misses() {
        let (adapter, connector) = adapter(Capability::Memcached);
        adapter.register_servers(&ServerPool::default());
        assert!(adapter.set("k", b"v", 0).await);

        connector.store().set_offline(true);
        assert_eq!(adapter.get("k").await, None);
        assert!(adapter.get_multi(&["k"]).await.is_empty());
        assert!(!adapter.set("k", b"v", 0).await);
        assert!(!adapter.add("other", b"v", 0).await);
        assert!(!adapter.delete("k").await);
        assert!(!adapter.flush().await);
    }

    #[tokio::test]
    async fn test_unregistered_adapter_misses() {
        let (adapter, _connector) = adapter(Capability::Memcache);
        assert_eq!(adapter.get("k").await, None);
        assert!(!adapter.set("k", b"v", 0).await);
    }
}
