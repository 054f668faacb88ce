//! The memcache-backed key-value data source.
//!
//! `KvCache` implements the storage primitives a data source needs
//! (`get_value`, `get_values`, `set_value`, `add_value`, `delete_value`,
//! `clear_values`) on top of the server pool, the expiration policy and the
//! client adapter.

use std::sync::OnceLock;

use bytes::Bytes;
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::adapter::CacheClientAdapter;
use crate::client::{Connector, NetworkConnector};
use crate::config::{CacheConfig, Capability};
use crate::error::CacheResult;
use crate::expiration::ExpirationPolicy;
use crate::pool::{ServerDescriptor, ServerPool};

/// A key-value cache over a pool of memcached nodes.
///
/// A miss and an unreachable pool look the same: reads return `None` and
/// writes return `false`. Only `init()` reports errors.
///
/// # Example
/// ```no_run
/// use kv_memcache::{CacheConfig, KvCache, ServerConfig};
///
/// # async fn run() -> kv_memcache::CacheResult<()> {
/// let config = CacheConfig::new()
///     .use_memcached(true)
///     .memcached_server(ServerConfig::new("127.0.0.1", 11211))
///     .build();
///
/// let cache = KvCache::new(config);
/// cache.init()?;
///
/// cache.set_value("user:123", "Alice", 300).await;
/// if let Some(value) = cache.get_value("user:123").await {
///     println!("Found: {:?}", value);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct KvCache<C: Connector = NetworkConnector> {
    config: CacheConfig,
    /// Set by the first successful `init()`.
    pool: OnceLock<ServerPool>,
    adapter: CacheClientAdapter<C>,
}

impl KvCache<NetworkConnector> {
    /// Create a cache that talks to real memcached nodes.
    ///
    /// Nothing connects until the first read or write.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_connector(config, NetworkConnector)
    }
}

impl<C: Connector> KvCache<C> {
    /// Create a cache whose native client comes from `connector`.
    pub fn with_connector(config: CacheConfig, connector: C) -> Self {
        let capability = config.capability();
        Self {
            config,
            pool: OnceLock::new(),
            adapter: CacheClientAdapter::with_connector(capability, connector),
        }
    }

    /// Build the server pool and register it with the client.
    ///
    /// Configuration errors are returned before the client is touched.
    /// Once servers are registered, later calls do nothing.
    pub fn init(&self) -> CacheResult<()> {
        if self.adapter.is_registered() {
            debug!(capability = %self.capability(), "cache already initialized");
            return Ok(());
        }

        let configured = ServerPool::configure(&self.config, self.capability())?;
        let pool = self.pool.get_or_init(|| configured);
        if self.adapter.register_servers(pool) {
            info!(
                capability = %self.capability(),
                servers = pool.len().max(1),
                "cache initialized"
            );
        }
        Ok(())
    }

    /// Whether servers have been registered with the client.
    pub fn is_initialized(&self) -> bool {
        self.adapter.is_registered()
    }

    /// The client capability selected by the configuration.
    pub fn capability(&self) -> Capability {
        self.adapter.capability()
    }

    /// The pool configured by `init()`. Empty before `init()`, and empty if
    /// the default node was used.
    pub fn servers(&self) -> &[ServerDescriptor] {
        self.pool.get().map(ServerPool::current).unwrap_or(&[])
    }

    /// The underlying client adapter.
    pub fn adapter(&self) -> &CacheClientAdapter<C> {
        &self.adapter
    }

    /// Retrieve a value. `None` on a miss or when the pool is unreachable.
    pub async fn get_value(&self, key: &str) -> Option<Bytes> {
        self.adapter.get(key).await
    }

    /// Retrieve several values. Keys that are not found are omitted.
    pub async fn get_values(&self, keys: &[&str]) -> IndexMap<String, Bytes> {
        self.adapter.get_multi(keys).await
    }

    /// Store a value. `ttl` is in seconds; `0` never expires.
    pub async fn set_value(&self, key: &str, value: impl AsRef<[u8]>, ttl: i64) -> bool {
        let expiry = ExpirationPolicy::normalize(ttl);
        self.adapter.set(key, value.as_ref(), expiry).await
    }

    /// Store a value only if the key is absent. `false` if it already exists.
    pub async fn add_value(&self, key: &str, value: impl AsRef<[u8]>, ttl: i64) -> bool {
        let expiry = ExpirationPolicy::normalize(ttl);
        self.adapter.add(key, value.as_ref(), expiry).await
    }

    /// Delete a key. `false` if it was absent or the pool is unreachable.
    pub async fn delete_value(&self, key: &str) -> bool {
        self.adapter.delete(key).await
    }

    /// Remove every value from the pool.
    pub async fn clear_values(&self) -> bool {
        self.adapter.flush().await
    }
}
