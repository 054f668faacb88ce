//! # KV Memcache
//!
//! A key-value data source over a pool of memcached servers, reachable
//! through either of two client capabilities: the legacy `memcache` client
//! or its `memcached` successor. Both sit behind one normalized surface.
//!
//! ## Features
//!
//! - **One surface, two clients**: argument order, multi-get and delete
//!   differences are hidden by `CacheClientAdapter`
//! - **Server pools**: weighted nodes with legacy timeout, retry and
//!   offline flags
//! - **Absolute expiry**: relative TTLs are sent as Unix timestamps
//! - **Degrades quietly**: an unreachable pool makes reads miss and writes
//!   return `false`
//!
//! ## Quick Start
//!
//! ```no_run
//! use kv_memcache::{CacheConfig, KvCache, ServerConfig};
//!
//! # async fn run() -> kv_memcache::CacheResult<()> {
//! let config = CacheConfig::new()
//!     .use_memcached(true)
//!     .memcached_server(ServerConfig::new("10.0.0.1", 11211).weight(2))
//!     .memcached_server(ServerConfig::new("10.0.0.2", 11211))
//!     .build();
//!
//! let cache = KvCache::new(config);
//! cache.init()?;
//!
//! cache.set_value("user:123", "Alice", 300).await;
//! let values = cache.get_values(&["user:123", "user:456"]).await;
//! println!("Found {} of 2", values.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing without a server
//!
//! `MemoryConnector` provides in-process clients with memcached's expiry
//! rules:
//!
//! ```
//! use kv_memcache::{CacheConfig, KvCache, MemoryConnector};
//!
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let cache = KvCache::with_connector(CacheConfig::default(), MemoryConnector::new());
//! cache.init().unwrap();
//!
//! assert!(cache.add_value("k", "v1", 0).await);
//! assert!(!cache.add_value("k", "v2", 0).await);
//! assert_eq!(cache.get_value("k").await.as_deref(), Some(&b"v1"[..]));
//! # });
//! ```

pub mod adapter;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod expiration;
pub mod logging;
pub mod memory;
pub mod pool;

pub use adapter::{CacheClientAdapter, ClientHandle};
pub use cache::KvCache;
pub use client::{Connector, LegacyClient, NetworkConnector, SuccessorClient};
pub use config::{CacheConfig, Capability, ServerConfig};
pub use error::{CacheError, CacheResult};
pub use expiration::ExpirationPolicy;
pub use memory::{MemoryConnector, Registration};
pub use pool::{ServerDescriptor, ServerPool};
