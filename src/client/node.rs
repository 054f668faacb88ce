//! Cache nodes and key distribution shared by the network clients.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_memcached::{AsciiProtocol, Client, Error as ProtocolError, Status, Value};
use bytes::Bytes;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};
use crate::pool::socket_address;

#[derive(Debug, Clone, Copy)]
pub(crate) enum StoreMode {
    Set,
    Add,
}

/// One registered memcached server.
///
/// The connection is opened on first use. A node that fails to connect or
/// times out is skipped until its retry interval has passed.
pub(crate) struct Node {
    address: String,
    weight: u32,
    persistent: bool,
    online: bool,
    timeout: Option<Duration>,
    /// `None` means a failed node is never retried.
    retry_interval: Option<Duration>,
    slot: AsyncMutex<Option<Client>>,
    failed_at: Mutex<Option<Instant>>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.address)
            .field("weight", &self.weight)
            .field("persistent", &self.persistent)
            .field("online", &self.online)
            .finish()
    }
}

impl Node {
    /// A node as the successor client sees it: persistent, always online,
    /// retried immediately.
    pub(crate) fn successor(host: &str, port: u16, weight: u32) -> Self {
        Self {
            address: socket_address(host, port),
            weight,
            persistent: true,
            online: true,
            timeout: None,
            retry_interval: Some(Duration::ZERO),
            slot: AsyncMutex::new(None),
            failed_at: Mutex::new(None),
        }
    }

    pub(crate) fn legacy(
        host: &str,
        port: u16,
        persistent: bool,
        weight: u32,
        timeout: u64,
        retry_interval: i64,
        status: bool,
    ) -> Self {
        Self {
            address: socket_address(host, port),
            weight,
            persistent,
            online: status,
            timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
            retry_interval: u64::try_from(retry_interval).ok().map(Duration::from_secs),
            slot: AsyncMutex::new(None),
            failed_at: Mutex::new(None),
        }
    }

    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    fn mark_failed(&self) {
        warn!(node = %self.address, "cache node marked as failed");
        *self.failed_at.lock() = Some(Instant::now());
    }

    /// Whether the node is still inside its post-failure back-off window.
    fn backing_off(&self) -> bool {
        match *self.failed_at.lock() {
            None => false,
            Some(at) => match self.retry_interval {
                Some(interval) => at.elapsed() < interval,
                None => true,
            },
        }
    }

    /// Check out this node's connection, opening it if needed.
    pub(crate) async fn connect(&self) -> CacheResult<Connection<'_>> {
        if !self.online {
            return Err(CacheError::Connection(format!(
                "{} is registered offline",
                self.address
            )));
        }
        if self.backing_off() {
            return Err(CacheError::Connection(format!(
                "{} is down, waiting for retry interval",
                self.address
            )));
        }

        let mut slot = self.slot.lock().await;
        let client = match slot.take() {
            Some(client) => client,
            None => {
                let dsn = format!("tcp://{}", self.address);
                let opened = self
                    .request("connect", Client::new(dsn.as_str()))
                    .await
                    .map_err(|e| match e {
                        CacheError::Backend(msg) => CacheError::Connection(msg),
                        other => other,
                    });
                match opened {
                    Ok(client) => {
                        debug!(node = %self.address, "connected");
                        *self.failed_at.lock() = None;
                        client
                    }
                    Err(e) => {
                        self.mark_failed();
                        return Err(e);
                    }
                }
            }
        };

        // The slot stays locked for the life of the checkout.
        Ok(Connection {
            node: self,
            slot,
            client,
        })
    }

    /// Run one request against this node, bounded by the node's timeout.
    ///
    /// Transport failures become `Connection` errors; protocol replies such
    /// as "not stored" become `Backend` errors.
    pub(crate) async fn request<T, F>(&self, op: &'static str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = Result<T, ProtocolError>>,
    {
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.mark_failed();
                    return Err(CacheError::Timeout(format!("{} on {}", op, self.address)));
                }
            },
            None => fut.await,
        };
        outcome.map_err(|e| {
            let message = format!("{} on {}: {}", op, self.address, e);
            match e {
                ProtocolError::Io(_) => CacheError::Connection(message),
                _ => CacheError::Backend(message),
            }
        })
    }

    pub(crate) async fn fetch(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let mut conn = self.connect().await?;
        let result = self
            .request("get", async { not_found_as_miss(conn.client().get(key).await) })
            .await;
        conn.finish(result)
            .map(|found| found.and_then(|value| value.data.map(Bytes::from)))
    }

    /// Fetch several keys in one round trip. Missing keys are absent.
    pub(crate) async fn fetch_many(&self, keys: &[&str]) -> CacheResult<HashMap<String, Bytes>> {
        let mut conn = self.connect().await?;
        let result = self
            .request("get_multi", async {
                not_found_as_miss(conn.client().get_multi(keys).await)
            })
            .await;
        conn.finish(result).map(into_entries)
    }

    pub(crate) async fn store(
        &self,
        mode: StoreMode,
        key: &str,
        value: &[u8],
        expire: u32,
        flags: Option<u32>,
    ) -> CacheResult<()> {
        let mut conn = self.connect().await?;
        let ttl = Some(i64::from(expire));
        let result = match mode {
            StoreMode::Set => {
                self.request("set", conn.client().set(key, value, ttl, flags))
                    .await
            }
            StoreMode::Add => {
                self.request("add", conn.client().add(key, value, ttl, flags))
                    .await
            }
        };
        conn.finish(result)
    }

    pub(crate) async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connect().await?;
        let result = self.request("delete", conn.client().delete(key)).await;
        conn.finish(result)
    }

    pub(crate) async fn flush(&self) -> CacheResult<()> {
        let mut conn = self.connect().await?;
        let result = self.request("flush", conn.client().flush_all()).await;
        conn.finish(result)
    }
}

/// A retrieval that found nothing is a miss, not a failure.
fn not_found_as_miss<T: Default>(result: Result<T, ProtocolError>) -> Result<T, ProtocolError> {
    match result {
        Err(ProtocolError::Protocol(Status::NotFound)) => Ok(T::default()),
        other => other,
    }
}

fn into_entries(values: Vec<Value>) -> HashMap<String, Bytes> {
    values
        .into_iter()
        .filter_map(|value| {
            let data = value.data?;
            Some((String::from_utf8_lossy(&value.key).into_owned(), Bytes::from(data)))
        })
        .collect()
}

/// A checked-out connection to one node.
pub(crate) struct Connection<'a> {
    node: &'a Node,
    slot: MutexGuard<'a, Option<Client>>,
    client: Client,
}

impl Connection<'_> {
    pub(crate) fn client(&mut self) -> &mut Client {
        &mut self.client
    }

    /// Return the connection after a request and pass its result through.
    /// The connection is kept unless the transport failed.
    pub(crate) fn finish<T>(self, result: CacheResult<T>) -> CacheResult<T> {
        let healthy = !matches!(
            result,
            Err(CacheError::Connection(_)) | Err(CacheError::Timeout(_))
        );
        self.release(healthy);
        result
    }

    /// Unhealthy or non-persistent connections are closed instead of kept.
    fn release(self, healthy: bool) {
        let Connection {
            node,
            mut slot,
            client,
        } = self;
        if healthy && node.persistent {
            *slot = Some(client);
        }
    }
}

#[derive(Debug, Default)]
struct NodeTable {
    nodes: Vec<Arc<Node>>,
    /// Node indexes, each repeated `weight` times.
    buckets: Vec<usize>,
}

/// The registered nodes of one client and the key-to-node mapping.
#[derive(Debug, Default)]
pub(crate) struct NodeSet {
    table: RwLock<NodeTable>,
}

impl NodeSet {
    pub(crate) fn add(&self, node: Node) {
        let mut table = self.table.write();
        let index = table.nodes.len();
        if node.online {
            for _ in 0..node.weight {
                table.buckets.push(index);
            }
        }
        debug!(node = %node.address, weight = node.weight, online = node.online, "node registered");
        table.nodes.push(Arc::new(node));
    }

    pub(crate) fn len(&self) -> usize {
        self.table.read().nodes.len()
    }

    /// Pick the node for a key.
    pub(crate) fn route(&self, key: &str) -> CacheResult<Arc<Node>> {
        let table = self.table.read();
        if table.buckets.is_empty() {
            return Err(CacheError::NoServers);
        }
        let index = table.buckets[bucket_for(key, table.buckets.len())];
        Ok(Arc::clone(&table.nodes[index]))
    }

    /// Group keys by the node they route to, in first-seen order.
    pub(crate) fn batches<'k>(
        &self,
        keys: &[&'k str],
    ) -> CacheResult<Vec<(Arc<Node>, Vec<&'k str>)>> {
        let table = self.table.read();
        if table.buckets.is_empty() {
            return Err(CacheError::NoServers);
        }
        let mut batches: IndexMap<usize, (Arc<Node>, Vec<&'k str>)> = IndexMap::new();
        for key in keys {
            let index = table.buckets[bucket_for(key, table.buckets.len())];
            batches
                .entry(index)
                .or_insert_with(|| (Arc::clone(&table.nodes[index]), Vec::new()))
                .1
                .push(*key);
        }
        Ok(batches.into_values().collect())
    }

    /// Fetch keys with one request per node.
    ///
    /// Keys on a failing node are skipped; the error is returned only when
    /// nothing could be fetched.
    pub(crate) async fn fetch_many(&self, keys: &[&str]) -> CacheResult<HashMap<String, Bytes>> {
        let mut found = HashMap::with_capacity(keys.len());
        let mut last_error = None;

        for (node, batch) in self.batches(keys)? {
            match node.fetch_many(&batch).await {
                Ok(values) => found.extend(values),
                Err(e) => {
                    debug!(node = %node.address(), keys = batch.len(), error = %e, "multi-key fetch failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if found.is_empty() => Err(e),
            _ => Ok(found),
        }
    }

    /// Every node that can receive keys.
    pub(crate) fn online(&self) -> CacheResult<Vec<Arc<Node>>> {
        let table = self.table.read();
        let nodes: Vec<_> = table
            .nodes
            .iter()
            .filter(|node| node.online)
            .cloned()
            .collect();
        if nodes.is_empty() {
            return Err(CacheError::NoServers);
        }
        Ok(nodes)
    }

    /// Flush every online node. Fails if any node could not be flushed.
    pub(crate) async fn flush(&self) -> CacheResult<()> {
        let mut outcome = Ok(());
        for node in self.online()? {
            if let Err(e) = node.flush().await {
                debug!(node = %node.address(), error = %e, "flush failed");
                outcome = Err(e);
            }
        }
        outcome
    }
}

/// CRC32-based bucket selection over the weighted bucket table.
fn bucket_for(key: &str, buckets: usize) -> usize {
    let hash = (crc32fast::hash(key.as_bytes()) >> 16) & 0x7fff;
    hash as usize % buckets
}
