//! Native client capabilities.
//!
//! The legacy and successor clients expose different call shapes: the legacy
//! one takes seven registration arguments, a flags word on every write, a
//! delay on delete, and fetches several keys through the same `get` that
//! fetches one. The successor takes three registration arguments and has a
//! dedicated multi-get. Each shape is a trait here; `CacheClientAdapter`
//! hides the difference.
//!
//! ```text
//! Connector
//!   ├── Legacy: LegacyClient        <- MemcacheClient (network), MemoryLegacyClient
//!   └── Successor: SuccessorClient  <- MemcachedClient (network), MemorySuccessorClient
//! ```

use std::collections::HashMap;
use std::future::Future;

use bytes::Bytes;

use crate::error::CacheResult;

pub mod memcache;
pub mod memcached;
pub(crate) mod node;
#[cfg(test)]
pub(crate) mod testing;

pub use memcache::MemcacheClient;
pub use memcached::MemcachedClient;

/// The legacy client surface, with its native argument order.
pub trait LegacyClient: Send + Sync + 'static {
    /// Register a node. Does not connect.
    #[allow(clippy::too_many_arguments)]
    fn add_server(
        &self,
        host: &str,
        port: u16,
        persistent: bool,
        weight: u32,
        timeout: u64,
        retry_interval: i64,
        status: bool,
    ) -> bool;

    /// Fetch a sequence of keys. Missing keys are absent from the mapping.
    fn get(&self, keys: &[&str]) -> impl Future<Output = CacheResult<HashMap<String, Bytes>>> + Send;

    fn set(
        &self,
        key: &str,
        value: &[u8],
        flags: u32,
        expire: u32,
    ) -> impl Future<Output = CacheResult<()>> + Send;

    /// Store only if the key is not present.
    fn add(
        &self,
        key: &str,
        value: &[u8],
        flags: u32,
        expire: u32,
    ) -> impl Future<Output = CacheResult<()>> + Send;

    /// Delete a key. `delay` is the deprecated delete-after window.
    fn delete(&self, key: &str, delay: u32) -> impl Future<Output = CacheResult<()>> + Send;

    fn flush(&self) -> impl Future<Output = CacheResult<()>> + Send;
}

/// The successor client surface, with its native argument order.
pub trait SuccessorClient: Send + Sync + 'static {
    /// Register a node. Does not connect.
    fn add_server(&self, host: &str, port: u16, weight: u32) -> bool;

    fn get(&self, key: &str) -> impl Future<Output = CacheResult<Option<Bytes>>> + Send;

    /// Fetch many keys at once. Missing keys are absent from the mapping.
    fn get_multi(
        &self,
        keys: &[&str],
    ) -> impl Future<Output = CacheResult<HashMap<String, Bytes>>> + Send;

    fn set(
        &self,
        key: &str,
        value: &[u8],
        expiration: u32,
    ) -> impl Future<Output = CacheResult<()>> + Send;

    /// Store only if the key is not present.
    fn add(
        &self,
        key: &str,
        value: &[u8],
        expiration: u32,
    ) -> impl Future<Output = CacheResult<()>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = CacheResult<()>> + Send;

    fn flush(&self) -> impl Future<Output = CacheResult<()>> + Send;
}

/// Factory for the native clients a `CacheClientAdapter` may own.
pub trait Connector: Send + Sync + 'static {
    type Legacy: LegacyClient;
    type Successor: SuccessorClient;

    fn legacy(&self) -> Self::Legacy;

    fn successor(&self) -> Self::Successor;
}

/// Builds clients that talk to real memcached nodes over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkConnector;

impl Connector for NetworkConnector {
    type Legacy = MemcacheClient;
    type Successor = MemcachedClient;

    fn legacy(&self) -> MemcacheClient {
        MemcacheClient::new()
    }

    fn successor(&self) -> MemcachedClient {
        MemcachedClient::new()
    }
}
