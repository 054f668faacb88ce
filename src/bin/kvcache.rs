//! Memcache key-value client.
//!
//! Runs a single cache operation against the servers given on the command
//! line, e.g. `kvcache -s 127.0.0.1:11211 set greeting hello --ttl 60`.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use kv_memcache::cli::{Cli, ClientCommand};
use kv_memcache::logging::init_logging;
use kv_memcache::KvCache;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging("warn");
    let args = Cli::parse();

    let cache = KvCache::new(args.cache_config());
    if let Err(e) = cache.init() {
        error!(error = %e, "failed to initialize cache");
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let ok = match args.command {
        ClientCommand::Get { key } => match cache.get_value(&key).await {
            Some(value) => {
                println!("{}", String::from_utf8_lossy(&value));
                true
            }
            None => {
                eprintln!("Key '{}' not found", key);
                false
            }
        },

        ClientCommand::GetMany { keys } => {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            let found = cache.get_values(&keys).await;
            for (key, value) in &found {
                println!("{}: {}", key, String::from_utf8_lossy(value));
            }
            !found.is_empty()
        }

        ClientCommand::Set { key, value, ttl } => {
            let stored = cache.set_value(&key, &value, ttl).await;
            if stored {
                println!("Set key '{}'", key);
            } else {
                eprintln!("Failed to set key '{}'", key);
            }
            stored
        }

        ClientCommand::Add { key, value, ttl } => {
            let stored = cache.add_value(&key, &value, ttl).await;
            if stored {
                println!("Added key '{}'", key);
            } else {
                eprintln!("Key '{}' not added (exists or server unavailable)", key);
            }
            stored
        }

        ClientCommand::Delete { key } => {
            let deleted = cache.delete_value(&key).await;
            if deleted {
                println!("Deleted key '{}'", key);
            } else {
                eprintln!("Key '{}' not deleted (missing or server unavailable)", key);
            }
            deleted
        }

        ClientCommand::Flush => {
            let flushed = cache.clear_values().await;
            if flushed {
                println!("Flushed all servers");
            } else {
                eprintln!("Flush failed");
            }
            flushed
        }
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
