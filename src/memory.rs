//! In-process clients for tests, benchmarks and local development.
//!
//! `MemoryConnector` hands out legacy and successor clients backed by one
//! shared map. It applies memcached's expiry rules and records every server
//! registration with the exact arguments it received, so callers can check
//! which native signature was used. `set_offline(true)` makes every
//! operation fail the way an unreachable pool does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;

use crate::client::{Connector, LegacyClient, SuccessorClient};
use crate::error::{CacheError, CacheResult};

/// Expiry values up to this many seconds are relative; larger ones are Unix
/// timestamps.
const RELATIVE_EXPIRY_LIMIT: u32 = 60 * 60 * 24 * 30;

/// One `add_server` call, as the native client saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Legacy {
        host: String,
        port: u16,
        persistent: bool,
        weight: u32,
        timeout: u64,
        retry_interval: i64,
        status: bool,
    },
    Successor {
        host: String,
        port: u16,
        weight: u32,
    },
}

impl Registration {
    /// Number of arguments the native registration call took.
    pub fn arity(&self) -> usize {
        match self {
            Registration::Legacy { .. } => 7,
            Registration::Successor { .. } => 3,
        }
    }

    /// The registered host.
    pub fn host(&self) -> &str {
        match self {
            Registration::Legacy { host, .. } | Registration::Successor { host, .. } => host,
        }
    }

    /// The registered port.
    pub fn port(&self) -> u16 {
        match self {
            Registration::Legacy { port, .. } | Registration::Successor { port, .. } => *port,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    data: Bytes,
    /// Absolute Unix time, `0` for never.
    expires_at: i64,
}

impl StoredValue {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at != 0 && now >= self.expires_at
    }
}

/// State shared by every client a `MemoryConnector` creates.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    registrations: Mutex<Vec<Registration>>,
    clients_created: AtomicUsize,
    offline: AtomicBool,
}

impl MemoryStore {
    /// Every registration received so far, in call order.
    pub fn registrations(&self) -> Vec<Registration> {
        self.registrations.lock().clone()
    }

    /// How many native clients the connector has built.
    pub fn clients_created(&self) -> usize {
        self.clients_created.load(Ordering::SeqCst)
    }

    /// Simulate an unreachable pool.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Utc::now().timestamp();
        self.entries
            .lock()
            .values()
            .filter(|v| !v.is_expired(now))
            .count()
    }

    /// Whether no live entries remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The absolute expiry recorded for a key.
    pub fn expiry_of(&self, key: &str) -> Option<i64> {
        self.entries.lock().get(key).map(|v| v.expires_at)
    }

    fn register(&self, registration: Registration) -> bool {
        self.registrations.lock().push(registration);
        true
    }

    fn reachable(&self) -> CacheResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Connection("memory store is offline".to_string()));
        }
        if self.registrations.lock().is_empty() {
            return Err(CacheError::NoServers);
        }
        Ok(())
    }

    fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        self.reachable()?;
        let now = Utc::now().timestamp();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(value) if value.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(value) => Ok(Some(value.data.clone())),
            None => Ok(None),
        }
    }

    fn get_many(&self, keys: &[&str]) -> CacheResult<HashMap<String, Bytes>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key)? {
                found.insert((*key).to_string(), value);
            }
        }
        Ok(found)
    }

    fn store(&self, key: &str, value: &[u8], expiry: u32, only_if_absent: bool) -> CacheResult<()> {
        self.reachable()?;
        let now = Utc::now().timestamp();
        let expires_at = match expiry {
            0 => 0,
            relative if relative <= RELATIVE_EXPIRY_LIMIT => now + i64::from(relative),
            absolute => i64::from(absolute),
        };

        let mut entries = self.entries.lock();
        if only_if_absent {
            if let Some(existing) = entries.get(key) {
                if !existing.is_expired(now) {
                    return Err(CacheError::Backend(format!("key '{}' exists", key)));
                }
            }
        }
        entries.insert(
            key.to_string(),
            StoredValue {
                data: Bytes::copy_from_slice(value),
                expires_at,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        self.reachable()?;
        match self.entries.lock().remove(key) {
            Some(_) => Ok(()),
            None => Err(CacheError::Backend(format!("key '{}' not found", key))),
        }
    }

    fn flush(&self) -> CacheResult<()> {
        self.reachable()?;
        self.entries.lock().clear();
        Ok(())
    }
}

/// Builds in-process clients sharing one `MemoryStore`.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
}

impl MemoryConnector {
    /// Create a connector with an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The store shared by every client this connector builds.
    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }
}

impl Connector for MemoryConnector {
    type Legacy = MemoryLegacyClient;
    type Successor = MemorySuccessorClient;

    fn legacy(&self) -> MemoryLegacyClient {
        self.store.clients_created.fetch_add(1, Ordering::SeqCst);
        MemoryLegacyClient {
            store: self.store(),
        }
    }

    fn successor(&self) -> MemorySuccessorClient {
        self.store.clients_created.fetch_add(1, Ordering::SeqCst);
        MemorySuccessorClient {
            store: self.store(),
        }
    }
}

/// In-process legacy client.
#[derive(Debug, Clone)]
pub struct MemoryLegacyClient {
    store: Arc<MemoryStore>,
}

impl LegacyClient for MemoryLegacyClient {
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
        self.store.register(Registration::Legacy {
            host: host.to_string(),
            port,
            persistent,
            weight,
            timeout,
            retry_interval,
            status,
        })
    }

    async fn get(&self, keys: &[&str]) -> CacheResult<HashMap<String, Bytes>> {
        self.store.get_many(keys)
    }

    async fn set(&self, key: &str, value: &[u8], _flags: u32, expire: u32) -> CacheResult<()> {
        self.store.store(key, value, expire, false)
    }

    async fn add(&self, key: &str, value: &[u8], _flags: u32, expire: u32) -> CacheResult<()> {
        self.store.store(key, value, expire, true)
    }

    async fn delete(&self, key: &str, delay: u32) -> CacheResult<()> {
        if delay != 0 {
            return Err(CacheError::Unsupported("delayed delete"));
        }
        self.store.delete(key)
    }

    async fn flush(&self) -> CacheResult<()> {
        self.store.flush()
    }
}

/// In-process successor client.
#[derive(Debug, Clone)]
pub struct MemorySuccessorClient {
    store: Arc<MemoryStore>,
}

impl SuccessorClient for MemorySuccessorClient {
    fn add_server(&self, host: &str, port: u16, weight: u32) -> bool {
        self.store.register(Registration::Successor {
            host: host.to_string(),
            port,
            weight,
        })
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        self.store.get(key)
    }

    async fn get_multi(&self, keys: &[&str]) -> CacheResult<HashMap<String, Bytes>> {
        self.store.get_many(keys)
    }

    async fn set(&self, key: &str, value: &[u8], expiration: u32) -> CacheResult<()> {
        self.store.store(key, value, expiration, false)
    }

    async fn add(&self, key: &str, value: &[u8], expiration: u32) -> CacheResult<()> {
        self.store.store(key, value, expiration, true)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.store.delete(key)
    }

    async fn flush(&self) -> CacheResult<()> {
        self.store.flush()
    }
}
