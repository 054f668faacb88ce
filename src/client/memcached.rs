//! Network implementation of the successor client.

use std::collections::HashMap;

use bytes::Bytes;

use super::node::{Node, NodeSet, StoreMode};
use super::SuccessorClient;
use crate::error::CacheResult;

/// Successor memcached client.
///
/// Connections are persistent and unbounded by a client-side timeout.
/// Multi-key reads issue one batched request per node.
#[derive(Debug, Default)]
pub struct MemcachedClient {
    nodes: NodeSet,
}

impl MemcachedClient {
    /// Create a client with no registered nodes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered nodes.
    pub fn server_count(&self) -> usize {
        self.nodes.len()
    }
}

impl SuccessorClient for MemcachedClient {
    fn add_server(&self, host: &str, port: u16, weight: u32) -> bool {
        if host.is_empty() || port == 0 || weight == 0 {
            return false;
        }
        self.nodes.add(Node::successor(host, port, weight));
        true
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        self.nodes.route(key)?.fetch(key).await
    }

    async fn get_multi(&self, keys: &[&str]) -> CacheResult<HashMap<String, Bytes>> {
        self.nodes.fetch_many(keys).await
    }

    async fn set(&self, key: &str, value: &[u8], expiration: u32) -> CacheResult<()> {
        self.nodes
            .route(key)?
            .store(StoreMode::Set, key, value, expiration, None)
            .await
    }

    async fn add(&self, key: &str, value: &[u8], expiration: u32) -> CacheResult<()> {
        self.nodes
            .route(key)?
            .store(StoreMode::Add, key, value, expiration, None)
            .await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.nodes.route(key)?.delete(key).await
    }

    /// Flushes every node; fails if any node could not be flushed.
    async fn flush(&self) -> CacheResult<()> {
        self.nodes.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::FakeMemcached;
    use crate::error::CacheError;

    #[test]
    fn test_add_server_validates() {
        let client = MemcachedClient::new();
        assert!(client.add_server("cache", 11211, 2));
        assert!(!client.add_server("cache", 11211, 0));
        assert!(!client.add_server("", 11211, 1));
        assert_eq!(client.server_count(), 1);
    }

    #[tokio::test]
    async fn test_no_servers_is_an_error() {
        let client = MemcachedClient::new();
        assert!(matches!(client.get("k").await, Err(CacheError::NoServers)));
        assert!(matches!(
            client.get_multi(&["a", "b"]).await,
            Err(CacheError::NoServers)
        ));
        assert!(matches!(client.set("k", b"v", 0).await, Err(CacheError::NoServers)));
    }

    #[tokio::test]
    async fn test_get_multi_empty_keys() {
        let client = MemcachedClient::new();
        client.add_server("cache", 11211, 1);
        assert!(client.get_multi(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_operations_against_server() {
        let server = FakeMemcached::start().await;
        let client = MemcachedClient::new();
        client.add_server("127.0.0.1", server.port(), 1);

        client.set("a", b"1", 0).await.unwrap();
        assert_eq!(client.get("a").await.unwrap(), Some(Bytes::from("1")));
        assert_eq!(client.get("missing").await.unwrap(), None);

        client.add("b", b"2", 0).await.unwrap();
        assert!(matches!(client.add("b", b"3", 0).await, Err(CacheError::Backend(_))));
        assert_eq!(client.get("b").await.unwrap(), Some(Bytes::from("2")));

        assert!(client.get_multi(&["x", "y"]).await.unwrap().is_empty());
        let found = client.get_multi(&["a", "x", "b"]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"], Bytes::from("2"));

        assert!(matches!(client.delete("missing").await, Err(CacheError::Backend(_))));
        client.delete("a").await.unwrap();
        assert_eq!(client.get("a").await.unwrap(), None);

        client.flush().await.unwrap();
        assert_eq!(client.get("b").await.unwrap(), None);

        assert_eq!(server.connections(), 1);
    }
}
