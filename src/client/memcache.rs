//! Network implementation of the legacy client.

use std::collections::HashMap;

use bytes::Bytes;

use super::node::{Node, NodeSet, StoreMode};
use super::LegacyClient;
use crate::error::{CacheError, CacheResult};

/// Legacy memcache client.
///
/// Honors every registration field: offline nodes receive no keys, each
/// connect and request is bounded by the node's timeout, failed nodes are
/// skipped for their retry interval and non-persistent connections are
/// closed after every request.
#[derive(Debug, Default)]
pub struct MemcacheClient {
    nodes: NodeSet,
}

impl MemcacheClient {
    /// Create a client with no registered nodes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered nodes, online or not.
    pub fn server_count(&self) -> usize {
        self.nodes.len()
    }
}

impl LegacyClient for MemcacheClient {
    fn add_server(
        &self,
        host: &str,
        port: u16,
        persistent: bool,
        weight: u32,
        timeout: u64,
        retry_interval: i64,
        status: bool,
    ) -> bool {
        if host.is_empty() || port == 0 || weight == 0 {
            return false;
        }
        self.nodes.add(Node::legacy(
            host,
            port,
            persistent,
            weight,
            timeout,
            retry_interval,
            status,
        ));
        true
    }

    /// Fetches with one request per node holding any of the keys.
    async fn get(&self, keys: &[&str]) -> CacheResult<HashMap<String, Bytes>> {
        self.nodes.fetch_many(keys).await
    }

    async fn set(&self, key: &str, value: &[u8], flags: u32, expire: u32) -> CacheResult<()> {
        self.nodes
            .route(key)?
            .store(StoreMode::Set, key, value, expire, Some(flags))
            .await
    }

    async fn add(&self, key: &str, value: &[u8], flags: u32, expire: u32) -> CacheResult<()> {
        self.nodes
            .route(key)?
            .store(StoreMode::Add, key, value, expire, Some(flags))
            .await
    }

    async fn delete(&self, key: &str, delay: u32) -> CacheResult<()> {
        if delay != 0 {
            return Err(CacheError::Unsupported("delayed delete"));
        }
        self.nodes.route(key)?.delete(key).await
    }

    async fn flush(&self) -> CacheResult<()> {
        self.nodes.flush().await
    }
}
