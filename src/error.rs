//! Error types for the key-value cache.
//!
//! Configuration problems are returned to the caller of `KvCache::init`.
//! Runtime backend failures are represented here too, but the adapter
//! converts them into `false` or a miss before they reach the public surface.

use std::io;

use thiserror::Error;

/// The main error type for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The server pool configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A server descriptor violates its invariants (empty host, zero port, ...).
    #[error("invalid server: {0}")]
    InvalidServer(String),

    /// No server is available to route a key to.
    #[error("no cache servers registered")]
    NoServers,

    /// A node could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// A request did not complete within the node's timeout.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The node answered with an error (key exists, not stored, ...).
    #[error("backend error: {0}")]
    Backend(String),

    /// The requested behavior is not supported by the memcached server.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CacheError {
    /// Whether this error comes from configuration rather than the network.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CacheError::Configuration(_) | CacheError::InvalidServer(_)
        )
    }
}

/// A specialized Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::Configuration("missing 'memcached' servers".to_string());
        assert_eq!(
            format!("{}", err),
            "configuration error: missing 'memcached' servers"
        );

        let err = CacheError::Unsupported("delayed delete");
        assert_eq!(format!("{}", err), "unsupported operation: delayed delete");

        assert_eq!(
            format!("{}", CacheError::NoServers),
            "no cache servers registered"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        let cache_err: CacheError = io_err.into();
        assert!(matches!(cache_err, CacheError::Io(_)));
        assert!(!cache_err.is_configuration());
    }

    #[test]
    fn test_is_configuration() {
        assert!(CacheError::InvalidServer("port 0".into()).is_configuration());
        assert!(!CacheError::Timeout("get".into()).is_configuration());
    }
}
