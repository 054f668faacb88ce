//! Server pool configuration.
//!
//! A `ServerPool` is the validated, ordered list of nodes a cache registers
//! with its client at `init()` time. It is built once and never touches the
//! network.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::config::{CacheConfig, Capability, ServerConfig};
use crate::error::{CacheError, CacheResult};

/// Host registered when the pool is empty.
pub const DEFAULT_HOST: &str = "localhost";

/// Port registered when the pool is empty.
pub const DEFAULT_PORT: u16 = 11211;

/// Bucket weight of a node that does not set one.
pub const DEFAULT_WEIGHT: u32 = 1;

/// Legacy connect and request timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 1;

/// Seconds a failed legacy node is skipped before it is tried again.
pub const DEFAULT_RETRY_INTERVAL_SECS: i64 = 15;

/// `host:port`, with IPv6 hosts in brackets.
pub(crate) fn socket_address(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Connection parameters for one cache node.
///
/// `persistent`, `timeout`, `retry_interval` and `status` only affect the
/// legacy capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    pub host: String,
    pub port: u16,
    pub weight: u32,
    pub persistent: bool,
    /// Seconds.
    pub timeout: u64,
    /// Seconds; negative disables retry after a failure.
    pub retry_interval: i64,
    pub status: bool,
}

impl ServerDescriptor {
    /// Create a descriptor with default optional fields.
    ///
    /// Fails if the host is empty or the port is zero.
    pub fn new(host: impl Into<String>, port: u16) -> CacheResult<Self> {
        let descriptor = Self {
            host: host.into(),
            port,
            weight: DEFAULT_WEIGHT,
            persistent: false,
            timeout: DEFAULT_TIMEOUT_SECS,
            retry_interval: DEFAULT_RETRY_INTERVAL_SECS,
            status: true,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// The node registered when no servers are configured.
    pub fn default_node() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            weight: DEFAULT_WEIGHT,
            persistent: false,
            timeout: DEFAULT_TIMEOUT_SECS,
            retry_interval: DEFAULT_RETRY_INTERVAL_SECS,
            status: true,
        }
    }

    /// Normalize a raw configuration entry.
    pub fn from_config(raw: &ServerConfig) -> CacheResult<Self> {
        let descriptor = Self {
            host: raw.host.trim().to_string(),
            port: raw.port,
            weight: raw.weight.unwrap_or(DEFAULT_WEIGHT),
            persistent: raw.persistent.unwrap_or(false),
            timeout: raw.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
            retry_interval: raw.retry_interval.unwrap_or(DEFAULT_RETRY_INTERVAL_SECS),
            status: raw.status.unwrap_or(true),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Replace the weight, re-checking that it is at least 1.
    pub fn with_weight(mut self, weight: u32) -> CacheResult<Self> {
        self.weight = weight;
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> CacheResult<()> {
        if self.host.is_empty() {
            return Err(CacheError::InvalidServer("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(CacheError::InvalidServer(format!(
                "{}: port must be greater than 0",
                self.host
            )));
        }
        if self.weight == 0 {
            return Err(CacheError::InvalidServer(format!(
                "{}:{}: weight must be at least 1",
                self.host, self.port
            )));
        }
        Ok(())
    }

    /// `host:port`, as used for connecting and in logs.
    pub fn address(&self) -> String {
        socket_address(&self.host, self.port)
    }
}

impl fmt::Display for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (weight {})", self.address(), self.weight)
    }
}

/// Parses `host:port` or `host:port:weight`. IPv6 hosts go in brackets,
/// as in `[::1]:11211:2`.
impl FromStr for ServerDescriptor {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || CacheError::InvalidServer(format!("expected host:port[:weight], got '{}'", s));

        let (host, rest) = match s.strip_prefix('[') {
            Some(bracketed) => {
                let (host, rest) = bracketed.split_once("]:").ok_or_else(invalid)?;
                (host, rest)
            }
            None => s.split_once(':').ok_or_else(invalid)?,
        };
        let (port, weight) = match rest.split_once(':') {
            Some((port, weight)) => (port, Some(weight)),
            None => (rest, None),
        };

        let port: u16 = port.parse().map_err(|_| invalid())?;
        let descriptor = ServerDescriptor::new(host, port)?;
        match weight {
            Some(w) => descriptor.with_weight(w.parse().map_err(|_| invalid())?),
            None => Ok(descriptor),
        }
    }
}

/// Ordered list of cache nodes for one capability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerPool {
    servers: Vec<ServerDescriptor>,
}

impl ServerPool {
    /// Create a pool from already-validated descriptors.
    pub fn new(servers: Vec<ServerDescriptor>) -> Self {
        Self { servers }
    }

    /// Build the pool for `capability` from the raw configuration.
    ///
    /// Reads only the server list keyed by the capability. Fails if the
    /// capability was chosen explicitly but its list is absent, or if any
    /// entry is invalid.
    pub fn configure(config: &CacheConfig, capability: Capability) -> CacheResult<Self> {
        let raw = match config.servers_for(capability) {
            Some(raw) => raw,
            None if config.is_explicit() => {
                return Err(CacheError::Configuration(format!(
                    "useMemcached selects '{}' but no '{}' servers are configured",
                    capability,
                    capability.config_key()
                )));
            }
            None => {
                let other = match capability {
                    Capability::Memcache => Capability::Memcached,
                    Capability::Memcached => Capability::Memcache,
                };
                if config.servers_for(other).is_some() {
                    warn!(
                        capability = %capability,
                        ignored = other.config_key(),
                        "server list for the inactive capability is ignored"
                    );
                }
                &[]
            }
        };

        let servers = raw
            .iter()
            .map(ServerDescriptor::from_config)
            .collect::<CacheResult<Vec<_>>>()
            .map_err(|e| CacheError::Configuration(format!("'{}': {}", capability.config_key(), e)))?;

        debug!(capability = %capability, servers = servers.len(), "server pool configured");
        Ok(Self { servers })
    }

    /// The configured servers, in insertion order.
    pub fn current(&self) -> &[ServerDescriptor] {
        &self.servers
    }

    /// Number of configured servers.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Whether no servers are configured.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config = CacheConfig::new()
            .use_memcached(false)
            .memcache_server(ServerConfig::new("cache1", 11211))
            .build();

        let pool = ServerPool::configure(&config, Capability::Memcache).unwrap();
        let server = &pool.current()[0];
        assert_eq!(server.weight, 1);
        assert!(!server.persistent);
        assert_eq!(server.timeout, 1);
        assert_eq!(server.retry_interval, 15);
        assert!(server.status);
    }

    #[test]
    fn test_selects_list_by_capability() {
        let config = CacheConfig::new()
            .memcache_server(ServerConfig::new("legacy", 11211))
            .memcached_server(ServerConfig::new("modern", 11211).weight(3))
            .build();

        let pool = ServerPool::configure(&config, Capability::Memcached).unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.current()[0].host, "modern");
        assert_eq!(pool.current()[0].weight, 3);

        let pool = ServerPool::configure(&config, Capability::Memcache).unwrap();
        assert_eq!(pool.current()[0].host, "legacy");
    }

    #[test]
    fn test_insertion_order_preserved() {
        let config = CacheConfig::new()
            .memcached_server(ServerConfig::new("c", 1))
            .memcached_server(ServerConfig::new("a", 2))
            .memcached_server(ServerConfig::new("b", 3))
            .build();

        let pool = ServerPool::configure(&config, Capability::Memcached).unwrap();
        let hosts: Vec<_> = pool.current().iter().map(|s| s.host.as_str()).collect();
        assert_eq!(hosts, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_explicit_capability_without_servers_fails() {
        let config = CacheConfig::new()
            .use_memcached(true)
            .memcache_server(ServerConfig::new("legacy", 11211))
            .build();

        let err = ServerPool::configure(&config, Capability::Memcached).unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
    }

    #[test]
    fn test_empty_config_gives_empty_pool() {
        let pool = ServerPool::configure(&CacheConfig::default(), Capability::Memcached).unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_invalid_entries_rejected() {
        for server in [
            ServerConfig::new("", 11211),
            ServerConfig::new("cache", 0),
            ServerConfig::new("cache", 11211).weight(0),
        ] {
            let config = CacheConfig::new().memcached_server(server).build();
            let err = ServerPool::configure(&config, Capability::Memcached).unwrap_err();
            assert!(err.is_configuration(), "unexpected error: {}", err);
        }
    }

    #[test]
    fn test_parse_descriptor() {
        let d: ServerDescriptor = "10.0.0.5:11212".parse().unwrap();
        assert_eq!(d.address(), "10.0.0.5:11212");
        assert_eq!(d.weight, 1);

        let d: ServerDescriptor = "cache:11211:4".parse().unwrap();
        assert_eq!(d.weight, 4);

        assert!("cache".parse::<ServerDescriptor>().is_err());
        assert!("cache:port".parse::<ServerDescriptor>().is_err());
        assert!(":11211".parse::<ServerDescriptor>().is_err());
        assert!("cache:11211:0".parse::<ServerDescriptor>().is_err());
        assert!("cache:11211:2:9".parse::<ServerDescriptor>().is_err());
    }

    #[test]
    fn test_parse_bracketed_ipv6() {
        let d: ServerDescriptor = "[::1]:11211".parse().unwrap();
        assert_eq!(d.host, "::1");
        assert_eq!(d.port, 11211);
        assert_eq!(d.address(), "[::1]:11211");

        let d: ServerDescriptor = "[fe80::2]:11212:3".parse().unwrap();
        assert_eq!(d.host, "fe80::2");
        assert_eq!(d.weight, 3);
        assert_eq!(d.to_string(), "[fe80::2]:11212 (weight 3)");

        assert!("[::1]".parse::<ServerDescriptor>().is_err());
        assert!("::1:11211".parse::<ServerDescriptor>().is_err());
    }
}
