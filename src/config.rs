//! Configuration for the key-value cache.
//!
//! The configuration mirrors the mapping the data source is handed at
//! `init()` time: a capability flag plus one optional server list per
//! capability. Only the list matching the flag is ever read.
//!
//! ```
//! use kv_memcache::{CacheConfig, ServerConfig};
//!
//! let config = CacheConfig::new()
//!     .use_memcached(true)
//!     .memcached_server(ServerConfig::new("10.0.0.1", 11211).weight(2))
//!     .build();
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which underlying client capability a cache talks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The legacy client, configured under `"memcache"`.
    Memcache,
    /// The successor client, configured under `"memcached"`.
    Memcached,
}

impl Capability {
    /// Select a capability from the `useMemcached` flag.
    pub fn from_flag(use_memcached: bool) -> Self {
        if use_memcached {
            Capability::Memcached
        } else {
            Capability::Memcache
        }
    }

    /// The configuration key holding this capability's server list.
    pub fn config_key(&self) -> &'static str {
        match self {
            Capability::Memcache => "memcache",
            Capability::Memcached => "memcached",
        }
    }

    /// Whether this is the `memcached` successor capability.
    pub fn is_successor(&self) -> bool {
        matches!(self, Capability::Memcached)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// One raw server entry, before normalization into a `ServerDescriptor`.
///
/// Only `host`, `port` and `weight` are read for the successor capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent: Option<bool>,
    /// Connect and request timeout, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Seconds before a failed node is tried again. Negative disables retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<i64>,
    /// `false` registers the node as offline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<bool>,
}

impl ServerConfig {
    /// Create an entry with every optional field left to its default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            weight: None,
            persistent: None,
            timeout: None,
            retry_interval: None,
            status: None,
        }
    }

    /// Set the node's bucket weight.
    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Keep the connection open between requests (legacy only).
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = Some(persistent);
        self
    }

    /// Set the connect and request timeout in seconds (legacy only).
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Set the back-off after a failure in seconds (legacy only).
    pub fn retry_interval(mut self, seconds: i64) -> Self {
        self.retry_interval = Some(seconds);
        self
    }

    /// Register the node as online or offline (legacy only).
    pub fn status(mut self, online: bool) -> Self {
        self.status = Some(online);
        self
    }
}

/// Configuration for creating a `KvCache`.
///
/// An empty configuration is valid: it selects the successor capability and
/// falls back to a single `localhost:11211` node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Explicit capability choice. `None` means the successor capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) use_memcached: Option<bool>,

    /// Servers for the legacy capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) memcache: Option<Vec<ServerConfig>>,

    /// Servers for the successor capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) memcached: Option<Vec<ServerConfig>>,
}

impl CacheConfig {
    /// Create a new configuration builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicitly select the successor (`true`) or legacy (`false`) capability.
    pub fn use_memcached(mut self, enabled: bool) -> Self {
        self.use_memcached = Some(enabled);
        self
    }

    /// Append a server to the legacy capability's list.
    pub fn memcache_server(mut self, server: ServerConfig) -> Self {
        self.memcache.get_or_insert_with(Vec::new).push(server);
        self
    }

    /// Append a server to the successor capability's list.
    pub fn memcached_server(mut self, server: ServerConfig) -> Self {
        self.memcached.get_or_insert_with(Vec::new).push(server);
        self
    }

    /// Replace a capability's server list. An empty list is kept as
    /// configured-but-empty, which registers the default node.
    pub fn with_servers(mut self, capability: Capability, servers: Vec<ServerConfig>) -> Self {
        match capability {
            Capability::Memcache => self.memcache = Some(servers),
            Capability::Memcached => self.memcached = Some(servers),
        }
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> Self {
        self
    }

    /// The capability this configuration selects.
    pub fn capability(&self) -> Capability {
        Capability::from_flag(self.use_memcached.unwrap_or(true))
    }

    /// Whether the capability was chosen explicitly rather than defaulted.
    pub fn is_explicit(&self) -> bool {
        self.use_memcached.is_some()
    }

    /// The raw server list for a capability, if one was configured.
    pub fn servers_for(&self, capability: Capability) -> Option<&[ServerConfig]> {
        match capability {
            Capability::Memcache => self.memcache.as_deref(),
            Capability::Memcached => self.memcached.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert!(config.use_memcached.is_none());
        assert!(!config.is_explicit());
        assert_eq!(config.capability(), Capability::Memcached);
        assert!(config.servers_for(Capability::Memcached).is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = CacheConfig::new()
            .use_memcached(false)
            .memcache_server(ServerConfig::new("a", 11211).timeout(3))
            .memcache_server(ServerConfig::new("b", 11212))
            .build();

        assert_eq!(config.capability(), Capability::Memcache);
        let servers = config.servers_for(Capability::Memcache).unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].timeout, Some(3));
        assert_eq!(servers[1].host, "b");
        assert!(config.servers_for(Capability::Memcached).is_none());
    }

    #[test]
    fn test_deserialize_camel_case() {
        let config: CacheConfig = serde_json::from_value(serde_json::json!({
            "useMemcached": false,
            "memcache": [
                {"host": "cache1", "port": 11211, "retryInterval": -1, "status": false}
            ]
        }))
        .unwrap();

        let server = &config.servers_for(Capability::Memcache).unwrap()[0];
        assert_eq!(server.retry_interval, Some(-1));
        assert_eq!(server.status, Some(false));
        assert_eq!(server.weight, None);
    }

    #[test]
    fn test_with_servers_replaces_list() {
        let config = CacheConfig::new()
            .memcached_server(ServerConfig::new("old", 11211))
            .with_servers(Capability::Memcached, vec![])
            .build();
        assert_eq!(config.servers_for(Capability::Memcached), Some(&[][..]));
    }

    #[test]
    fn test_capability_keys() {
        assert_eq!(Capability::from_flag(true).config_key(), "memcached");
        assert_eq!(Capability::from_flag(false).to_string(), "memcache");
        assert!(Capability::Memcached.is_successor());
    }
}
