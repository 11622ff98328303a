//! Memcached cache backend implementation.

use super::{CacheBackend, ServerStats};
use crate::config::MemcachedConfig;
use crate::error::{Error, Result};
use async_memcached::{AsciiProtocol, Client};
use deadpool_memcached::{Manager, Pool};
use std::collections::HashMap;
use std::future::Future;
use std::ops::DerefMut;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Memcached reads expirations above this many seconds (30 days) as absolute
/// unix timestamps instead of offsets from now.
const MAX_RELATIVE_EXPIRATION: u64 = 60 * 60 * 24 * 30;

struct Inner {
    servers: RwLock<Vec<String>>,
    pool: RwLock<Option<Pool>>,
    pool_size: u32,
    timeout: Duration,
}

/// Memcached client over an async connection pool.
///
/// The pool is created when the first server is registered; until then every
/// data call fails with `Error::BackendError`. Only the first registered
/// server receives traffic. Clones share the same pool, so the physical
/// connection count stays at `pool_size` however many handles exist.
///
/// Every call, connection checkout included, is bounded by the configured
/// connection timeout.
///
/// # Example
///
/// ```no_run
/// # use cache_pool::backend::{CacheBackend, MemcachedBackend};
/// # use cache_pool::config::MemcachedConfig;
/// # async fn example() -> cache_pool::Result<()> {
/// let backend = MemcachedBackend::new(&MemcachedConfig::default());
/// backend.add_server("localhost", 11211)?;
///
/// backend.set("key", b"value".to_vec(), None).await?;
/// let value = backend.get("key").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemcachedBackend {
    inner: Arc<Inner>,
}

impl MemcachedBackend {
    /// Create a client with no servers registered.
    ///
    /// Only `pool_size` and `connection_timeout` are read from `config`; the
    /// adapter registers the configured host and port.
    pub fn new(config: &MemcachedConfig) -> Self {
        MemcachedBackend {
            inner: Arc::new(Inner {
                servers: RwLock::new(Vec::new()),
                pool: RwLock::new(None),
                pool_size: config.pool_size.max(1),
                timeout: config.connection_timeout,
            }),
        }
    }

    fn pool(&self) -> Result<Pool> {
        self.inner
            .pool
            .read()
            .map_err(|_| Error::Other("memcached pool lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| Error::BackendError("No memcached server registered".to_string()))
    }

    async fn connection(&self) -> Result<impl DerefMut<Target = Client>> {
        self.pool()?.get().await.map_err(|e| {
            Error::BackendError(format!("Failed to get Memcached connection: {}", e))
        })
    }

    async fn bounded<T>(&self, command: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.inner.timeout, call)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "Memcached {} exceeded {:?}",
                    command, self.inner.timeout
                ))
            })?
    }
}

/// Memcached parses "exptime" as a signed 32-bit integer; absolute
/// timestamps are capped here.
const MAX_ABSOLUTE_EXPIRATION: i64 = i32::MAX as i64;

/// Memcached "expiration" argument for a TTL. `None` never expires.
///
/// Memcached counts whole seconds, so fractions round up; a 0 would mean
/// "never expires". Absolute timestamps saturate at
/// [`MAX_ABSOLUTE_EXPIRATION`] and never go negative.
fn expiration(ttl: Option<Duration>, now: SystemTime) -> Option<i64> {
    let ttl = ttl?;
    let secs = ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0));
    if secs <= MAX_RELATIVE_EXPIRATION {
        return Some(secs as i64);
    }

    let now = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let at = i64::try_from(now.saturating_add(secs)).unwrap_or(i64::MAX);
    Some(at.min(MAX_ABSOLUTE_EXPIRATION))
}

fn is_not_found(e: &async_memcached::Error) -> bool {
    e.to_string().to_lowercase().contains("not found")
}

impl CacheBackend for MemcachedBackend {
    fn add_server(&self, host: &str, port: u16) -> Result<()> {
        let addr = format!("{}:{}", host, port);

        let mut servers = self
            .inner
            .servers
            .write()
            .map_err(|_| Error::Other("memcached server list lock poisoned".to_string()))?;
        let mut pool = self
            .inner
            .pool
            .write()
            .map_err(|_| Error::Other("memcached pool lock poisoned".to_string()))?;

        if pool.is_none() {
            let manager = Manager::new(addr.clone());
            let built = Pool::builder(manager)
                .max_size(self.inner.pool_size as usize)
                .build()
                .map_err(|e| {
                    Error::ConfigError(format!("Failed to create connection pool: {}", e))
                })?;
            *pool = Some(built);

            info!(
                "✓ Memcached backend initialized with server: {} (pool size: {})",
                addr, self.inner.pool_size
            );
        } else {
            warn!(
                "Memcached server {} registered but traffic stays on {}",
                addr,
                servers.first().map(String::as_str).unwrap_or("?")
            );
        }

        servers.push(addr);
        Ok(())
    }

    fn server_list(&self) -> Vec<String> {
        self.inner
            .servers
            .read()
            .map(|servers| servers.clone())
            .unwrap_or_default()
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.bounded("GET", async {
            let mut conn = self.connection().await?;

            match conn.get(key).await {
                Ok(Some(value)) => {
                    debug!("✓ Memcached GET {} -> HIT", key);
                    Ok(value.data)
                }
                Ok(None) => {
                    debug!("✓ Memcached GET {} -> MISS", key);
                    Ok(None)
                }
                Err(e) if is_not_found(&e) => {
                    debug!("✓ Memcached GET {} -> MISS", key);
                    Ok(None)
                }
                Err(e) => Err(Error::BackendError(format!(
                    "Memcached GET failed for key {}: {}",
                    key, e
                ))),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.bounded("SET", async {
            let mut conn = self.connection().await?;

            let expiration = expiration(ttl, SystemTime::now());

            // Correct parameter order: set(key, value, ttl, flags)
            conn.set(key, value.as_slice(), expiration, None)
                .await
                .map_err(|e| {
                    Error::BackendError(format!("Memcached SET failed for key {}: {}", key, e))
                })?;

            if let Some(d) = ttl {
                debug!("✓ Memcached SET {} (TTL: {:?})", key, d);
            } else {
                debug!("✓ Memcached SET {}", key);
            }

            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.bounded("DELETE", async {
            let mut conn = self.connection().await?;

            match conn.delete(key).await {
                Ok(()) => {
                    debug!("✓ Memcached DELETE {}", key);
                    Ok(true)
                }
                Err(e) if is_not_found(&e) => {
                    debug!("✓ Memcached DELETE {} (not found)", key);
                    Ok(false)
                }
                Err(e) => Err(Error::BackendError(format!(
                    "Memcached DELETE failed for key {}: {}",
                    key, e
                ))),
            }
        })
        .await
    }

    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        self.bounded("MGET", async {
            let mut conn = self.connection().await?;

            // Single round trip; "not found" just means no key exists
            let values = match conn.get_multi(keys).await {
                Ok(vals) => vals,
                Err(e) if is_not_found(&e) => {
                    debug!("✓ Memcached MGET {} keys (all miss)", keys.len());
                    return Ok(vec![None; keys.len()]);
                }
                Err(e) => {
                    return Err(Error::BackendError(format!("Memcached MGET failed: {}", e)));
                }
            };

            let mut value_map = HashMap::with_capacity(values.len());
            for value in values {
                let key_str = String::from_utf8_lossy(&value.key).to_string();
                if let Some(data) = value.data {
                    value_map.insert(key_str, data);
                }
            }

            // Back to request order, one slot per requested key
            let results: Vec<Option<Vec<u8>>> =
                keys.iter().map(|key| value_map.get(*key).cloned()).collect();

            debug!("✓ Memcached MGET {} keys (batch operation)", keys.len());
            Ok(results)
        })
        .await
    }

    async fn clear_all(&self) -> Result<()> {
        self.bounded("FLUSH_ALL", async {
            let mut conn = self.connection().await?;

            conn.flush_all()
                .await
                .map_err(|e| Error::BackendError(format!("Memcached FLUSH_ALL failed: {}", e)))?;

            warn!("⚠ Memcached FLUSH_ALL executed - all cache cleared!");
            Ok(())
        })
        .await
    }

    /// Stats of the server that answered, keyed by the first registered
    /// address. Only that server receives traffic, so the reply cannot name
    /// another one.
    async fn stats(&self) -> Result<ServerStats> {
        let addr = self
            .server_list()
            .into_iter()
            .next()
            .ok_or_else(|| Error::BackendError("No memcached server registered".to_string()))?;

        let stats = self
            .bounded("STATS", async {
                let mut conn = self.connection().await?;
                conn.stats()
                    .await
                    .map_err(|e| Error::BackendError(format!("Memcached STATS failed: {}", e)))
            })
            .await?;

        let mut by_server = ServerStats::new();
        by_server.insert(addr, stats.into_iter().collect());
        Ok(by_server)
    }
}
