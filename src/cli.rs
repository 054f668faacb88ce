//! Command-line interface definitions.
//!
//! This module defines the CLI structure for the `kvcache` client using clap.

use clap::{Parser, Subcommand};

use crate::config::{CacheConfig, Capability, ServerConfig};
use crate::pool::ServerDescriptor;

/// Memcache key-value client.
///
/// Runs one operation against a pool of memcached servers.
#[derive(Parser, Debug)]
#[command(name = "kvcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Server to register, as host:port or host:port:weight. Repeatable.
    /// Defaults to localhost:11211.
    #[arg(short, long = "server", value_name = "HOST:PORT[:WEIGHT]", global = true)]
    pub servers: Vec<ServerDescriptor>,

    /// Use the legacy memcache client instead of memcached.
    #[arg(long, global = true)]
    pub legacy: bool,

    /// Connect and request timeout in seconds (legacy client only).
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: ClientCommand,
}

impl Cli {
    /// The cache configuration described by the flags.
    pub fn cache_config(&self) -> CacheConfig {
        let capability = Capability::from_flag(!self.legacy);
        let servers = self
            .servers
            .iter()
            .map(|server| {
                let entry = ServerConfig::new(server.host.clone(), server.port).weight(server.weight);
                match self.timeout {
                    Some(timeout) => entry.timeout(timeout),
                    None => entry,
                }
            })
            .collect();

        CacheConfig::new()
            .use_memcached(capability.is_successor())
            .with_servers(capability, servers)
            .build()
    }
}

/// Available client commands.
#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    /// Get a value by key.
    ///
    /// Prints nothing and exits non-zero if the key is missing.
    Get {
        /// The key to look up.
        key: String,
    },

    /// Get several values at once.
    GetMany {
        /// The keys to look up.
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Set a key-value pair.
    Set {
        key: String,
        value: String,
        /// Seconds until the value expires. 0 never expires.
        #[arg(long, default_value_t = 0)]
        ttl: i64,
    },

    /// Set a key-value pair only if the key does not exist.
    Add {
        key: String,
        value: String,
        /// Seconds until the value expires. 0 never expires.
        #[arg(long, default_value_t = 0)]
        ttl: i64,
    },

    /// Delete a key.
    Delete {
        /// The key to delete.
        key: String,
    },

    /// Remove every value from every server.
    Flush,
}
