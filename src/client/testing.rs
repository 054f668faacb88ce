//! A minimal memcached text-protocol server for client tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct ServerState {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    commands: Mutex<Vec<String>>,
    connections: AtomicUsize,
}

/// Serves `get`, `gets`, `set`, `add`, `delete`, `flush_all` and `version` from an
/// in-memory map on a loopback port.
pub(crate) struct FakeMemcached {
    port: u16,
    state: Arc<ServerState>,
    task: JoinHandle<()>,
}

impl FakeMemcached {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(ServerState::default());

        let accept_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, Arc::clone(&accept_state)));
            }
        });

        Self { port, state, task }
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// TCP connections accepted so far.
    pub(crate) fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Command lines received so far, without payloads.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.state.commands.lock().clone()
    }
}

impl Drop for FakeMemcached {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(stream: TcpStream, state: Arc<ServerState>) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        state.commands.lock().push(parts.join(" "));

        let reply: Vec<u8> = match parts.as_slice() {
            [cmd @ ("get" | "gets"), keys @ ..] => {
                let entries = state.entries.lock();
                let mut reply = Vec::new();
                for key in keys {
                    if let Some(data) = entries.get(*key) {
                        let header = if *cmd == "gets" {
                            format!("VALUE {} 0 {} 1\r\n", key, data.len())
                        } else {
                            format!("VALUE {} 0 {}\r\n", key, data.len())
                        };
                        reply.extend_from_slice(header.as_bytes());
                        reply.extend_from_slice(data);
                        reply.extend_from_slice(b"\r\n");
                    }
                }
                reply.extend_from_slice(b"END\r\n");
                reply
            }
            [cmd @ ("set" | "add"), key, _flags, _ttl, len, ..] => {
                let Ok(len) = len.parse::<usize>() else {
                    return;
                };
                let mut data = vec![0u8; len + 2];
                if reader.read_exact(&mut data).await.is_err() {
                    return;
                }
                data.truncate(len);

                let mut entries = state.entries.lock();
                if *cmd == "add" && entries.contains_key(*key) {
                    b"NOT_STORED\r\n".to_vec()
                } else {
                    entries.insert((*key).to_string(), data);
                    b"STORED\r\n".to_vec()
                }
            }
            ["delete", key, ..] => match state.entries.lock().remove(*key) {
                Some(_) => b"DELETED\r\n".to_vec(),
                None => b"NOT_FOUND\r\n".to_vec(),
            },
            ["version"] => b"VERSION 1.6.21\r\n".to_vec(),
            ["flush_all", ..] => {
                state.entries.lock().clear();
                b"OK\r\n".to_vec()
            }
            _ => b"ERROR\r\n".to_vec(),
        };

        if writer.write_all(&reply).await.is_err() {
            return;
        }
    }
}

/// A loopback port with nothing listening on it.
pub(crate) async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
