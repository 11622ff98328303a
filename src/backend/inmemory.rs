//! In-process cache backend (thread-safe, async).
//!
//! Uses DashMap for lock-free concurrent access with per-key sharding and
//! handles TTL expiration on access. Stands in for a memcached server in
//! tests and local runs; it can be switched unreachable to simulate an outage.

use super::{CacheBackend, ServerStats};
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// In-memory cache entry with optional expiration.
struct CacheEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    /// A TTL too large for the clock never expires.
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.and_then(|d| Instant::now().checked_add(d));
        CacheEntry { data, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() > exp)
    }
}

/// Thread-safe async in-memory cache backend.
///
/// Clones share the same store, server list and reachability flag.
///
/// # Example
///
/// ```no_run
/// use cache_pool::backend::{CacheBackend, InMemoryBackend};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = InMemoryBackend::new();
///
///     backend.set("key1", b"value".to_vec(), None).await?;
///     assert!(backend.get("key1").await?.is_some());
///
///     backend.set("key2", b"expires".to_vec(), Some(Duration::from_secs(300))).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, CacheEntry>>,
    servers: Arc<RwLock<Vec<String>>>,
    reachable: Arc<AtomicBool>,
}

impl InMemoryBackend {
    /// Create a new, reachable in-memory backend with no servers registered.
    pub fn new() -> Self {
        InMemoryBackend {
            store: Arc::new(DashMap::new()),
            servers: Arc::new(RwLock::new(Vec::new())),
            reachable: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate the server going down (`false`) or coming back (`true`).
    ///
    /// While unreachable every data call and stats request fails.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Get the current number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Remaining lifetime of a live entry.
    ///
    /// - `None`: key absent or expired
    /// - `Some(None)`: entry never expires
    /// - `Some(Some(d))`: entry expires in `d`
    pub fn ttl(&self, key: &str) -> Option<Option<Duration>> {
        let entry = self.store.get(key)?;
        if entry.is_expired() {
            return None;
        }
        Some(
            entry
                .expires_at
                .map(|exp| exp.saturating_duration_since(Instant::now())),
        )
    }

    /// Get memory statistics.
    pub fn memory_stats(&self) -> CacheStats {
        let total_bytes: usize = self.store.iter().map(|entry| entry.data.len()).sum();
        let expired_count = self.store.iter().filter(|entry| entry.is_expired()).count();

        CacheStats {
            total_entries: self.store.len(),
            expired_entries: expired_count,
            total_bytes,
        }
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::BackendError(
                "InMemory backend unreachable".to_string(),
            ))
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for InMemoryBackend {
    fn add_server(&self, host: &str, port: u16) -> Result<()> {
        let mut servers = self
            .servers
            .write()
            .map_err(|_| Error::Other("server list lock poisoned".to_string()))?;
        servers.push(format!("{}:{}", host, port));
        Ok(())
    }

    fn server_list(&self) -> Vec<String> {
        self.servers
            .read()
            .map(|servers| servers.clone())
            .unwrap_or_default()
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_reachable()?;

        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                debug!("✓ InMemory GET {} -> HIT", key);
                return Ok(Some(entry.data.clone()));
            }
        }

        // Remove expired entry if it exists
        self.store.remove(key);
        debug!("✓ InMemory GET {} -> MISS", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.ensure_reachable()?;

        let entry = CacheEntry::new(value, ttl);
        self.store.insert(key.to_string(), entry);

        if let Some(d) = ttl {
            debug!("✓ InMemory SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ InMemory SET {}", key);
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_reachable()?;

        let existed = self
            .store
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired());
        debug!("✓ InMemory DELETE {} (found: {})", key, existed);
        Ok(existed)
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        self.ensure_reachable()?;

        let results: Vec<Option<Vec<u8>>> = keys
            .iter()
            .map(|k| {
                self.store
                    .get(*k)
                    .filter(|entry| !entry.is_expired())
                    .map(|entry| entry.data.clone())
            })
            .collect();

        debug!("✓ InMemory MGET {} keys", keys.len());
        Ok(results)
    }

    async fn clear_all(&self) -> Result<()> {
        self.ensure_reachable()?;

        self.store.clear();
        warn!("⚠ InMemory CLEAR_ALL executed - all cache cleared!");
        Ok(())
    }

    async fn stats(&self) -> Result<ServerStats> {
        self.ensure_reachable()?;

        let memory = self.memory_stats();
        let live = memory.total_entries - memory.expired_entries;
        let per_server: HashMap<String, String> = [
            ("pid".to_string(), std::process::id().to_string()),
            ("curr_items".to_string(), live.to_string()),
            ("bytes".to_string(), memory.total_bytes.to_string()),
        ]
        .into_iter()
        .collect();

        Ok(self
            .server_list()
            .into_iter()
            .map(|server| (server, per_server.clone()))
            .collect())
    }
}

/// Cache statistics.
#[derive(Clone, Debug)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub total_bytes: usize,
}
