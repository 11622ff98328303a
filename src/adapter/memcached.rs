//! Memcached adapter: binds the pool hooks to a memcached client.

use super::CacheAdapter;
use crate::backend::CacheBackend;
use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::item::CacheItem;
use crate::key::KeyRules;
use crate::serialization::{decode_value, encode_value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[cfg(feature = "memcached")]
use crate::backend::MemcachedBackend;
#[cfg(feature = "memcached")]
use crate::config::MemcachedConfig;

/// Adapter storing encoded values on a memcached server.
///
/// Build one per process at startup and share it (`Arc<MemcachedAdapter>`)
/// between every pool and service that needs the cache; all of them then go
/// through the same client connection. The adapter is deliberately not
/// `Clone`.
///
/// # Configuration changes
///
/// [`MemcachedAdapter::set_configuration`] swaps the configuration in place.
/// The new default TTL applies to the next save, but a new host or port is
/// **not** picked up: the client keeps talking to the server registered at
/// construction. Build a new adapter to move to another server.
///
/// # Example
///
/// ```no_run
/// use cache_pool::adapter::MemcachedAdapter;
/// use cache_pool::config::MemcachedConfig;
/// use cache_pool::CachePool;
/// use std::sync::Arc;
///
/// # async fn example() -> cache_pool::Result<()> {
/// let config = MemcachedConfig::new("localhost", 11211)
///     .with_time_to_live(60)
///     .with_check_connection(true);
/// let adapter = Arc::new(MemcachedAdapter::new(config).await?);
///
/// let users: CachePool<_, String> = CachePool::new(adapter.clone());
/// let counters: CachePool<_, u64> = CachePool::new(adapter);
/// # Ok(())
/// # }
/// ```
pub struct MemcachedAdapter<B: CacheBackend> {
    backend: B,
    configuration: RwLock<Arc<dyn Configuration>>,
}

#[cfg(feature = "memcached")]
impl MemcachedAdapter<MemcachedBackend> {
    /// Connect to the server named by `config` through a fresh client.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionError` if `config.check_connection` is set
    /// and the server does not answer.
    pub async fn new(config: MemcachedConfig) -> Result<Self> {
        let backend = MemcachedBackend::new(&config);
        Self::with_backend(config, backend).await
    }
}

impl<B: CacheBackend> MemcachedAdapter<B> {
    /// Build an adapter on an existing client.
    ///
    /// Registers the configured `host:port` on the client unless it already
    /// has servers, then verifies connectivity if the configuration asks for
    /// it.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionError` if the server cannot be registered,
    /// or if the connection check is requested and the stats reply does not
    /// list the configured `host:port`.
    pub async fn with_backend<C>(configuration: C, backend: B) -> Result<Self>
    where
        C: Configuration + 'static,
    {
        if backend.server_list().is_empty() {
            backend
                .add_server(configuration.host(), configuration.port())
                .map_err(|e| Error::ConnectionError(e.to_string()))?;
        }

        let configuration: Arc<dyn Configuration> = Arc::new(configuration);
        let adapter = MemcachedAdapter {
            backend,
            configuration: RwLock::new(configuration),
        };

        if adapter.configuration().should_check_connection() {
            adapter.check_connection().await?;
        }

        info!(
            "✓ Memcached adapter ready (servers: {})",
            adapter.backend.server_list().join(", ")
        );
        Ok(adapter)
    }

    /// Ask the server for stats and expect an entry for the configured
    /// `host:port`.
    ///
    /// The memcached client labels its reply with the first registered
    /// server, not with the address that answered. When the client was
    /// built with this configuration that is the configured address, so the
    /// check proves that server answered. A client handed in with other
    /// servers already registered fails the check unless its first server is
    /// the configured one.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionError` when the stats call fails or the
    /// address is absent from the reply.
    pub async fn check_connection(&self) -> Result<()> {
        let address = self.configuration().address();

        let stats = self.backend.stats().await.map_err(|e| {
            error!("Memcached connection check failed for {}: {}", address, e);
            Error::ConnectionError(format!("{} did not answer stats: {}", address, e))
        })?;

        if !stats.contains_key(&address) {
            error!("Memcached connection check: {} absent from stats", address);
            return Err(Error::ConnectionError(format!(
                "{} absent from stats reply",
                address
            )));
        }

        debug!("✓ Memcached connection check passed for {}", address);
        Ok(())
    }

    /// Current configuration.
    pub fn configuration(&self) -> Arc<dyn Configuration> {
        self.configuration
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the configuration without reconnecting.
    pub fn set_configuration<C>(&self, configuration: C)
    where
        C: Configuration + 'static,
    {
        let mut current = self
            .configuration
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if current.address() != configuration.address() {
            warn!(
                "Memcached configuration now names {} but the client stays on {}",
                configuration.address(),
                self.backend.server_list().join(", ")
            );
        }

        *current = Arc::new(configuration);
    }

    /// The underlying client.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// TTL to send for a save: explicit value, else the configured default.
    /// Zero becomes `None` (never expires).
    fn resolve_ttl(&self, ttl: Option<Duration>) -> Option<Duration> {
        let ttl = ttl.unwrap_or_else(|| self.configuration().time_to_live());
        (!ttl.is_zero()).then_some(ttl)
    }
}

fn decode_item<V: DeserializeOwned>(key: &str, bytes: Option<Vec<u8>>) -> CacheItem<V> {
    match bytes {
        Some(bytes) => match decode_value(&bytes) {
            Ok(value) => CacheItem::hit(key, value),
            Err(e) => {
                warn!("Treating undecodable entry {} as a miss: {}", key, e);
                CacheItem::new(key)
            }
        },
        None => CacheItem::new(key),
    }
}

impl<B: CacheBackend> CacheAdapter for MemcachedAdapter<B> {
    fn key_rules(&self) -> KeyRules {
        KeyRules::MEMCACHED
    }

    async fn fetch_object<V>(&self, key: &str) -> CacheItem<V>
    where
        V: DeserializeOwned + Send,
    {
        match self.backend.get(key).await {
            Ok(bytes) => decode_item(key, bytes),
            Err(e) => {
                warn!("Memcached fetch of {} failed, reporting miss: {}", key, e);
                CacheItem::new(key)
            }
        }
    }

    async fn fetch_multi_objects<V>(&self, keys: &[&str]) -> HashMap<String, CacheItem<V>>
    where
        V: DeserializeOwned + Send,
    {
        let values = match self.backend.mget(keys).await {
            Ok(values) => values,
            Err(e) => {
                warn!(
                    "Memcached multi-fetch of {} keys failed, reporting misses: {}",
                    keys.len(),
                    e
                );
                vec![None; keys.len()]
            }
        };

        let mut items = HashMap::with_capacity(keys.len());
        for (key, bytes) in keys.iter().zip(values) {
            items.insert(key.to_string(), decode_item(key, bytes));
        }
        // A short reply still owes one item per key
        for key in keys {
            items
                .entry(key.to_string())
                .or_insert_with(|| CacheItem::new(*key));
        }
        items
    }

    async fn clear_all_objects(&self) -> bool {
        match self.backend.clear_all().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Memcached flush failed: {}", e);
                false
            }
        }
    }

    async fn clear_one_object(&self, key: &str) -> bool {
        match self.backend.delete(key).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Memcached delete of {} failed: {}", key, e);
                false
            }
        }
    }

    async fn store_item<V>(&self, key: &str, item: &CacheItem<V>, ttl: Option<Duration>) -> bool
    where
        V: Serialize + Sync,
    {
        let value = match item.get() {
            Ok(value) => value,
            Err(e) => {
                warn!("Refusing to store {}: {}", key, e);
                return false;
            }
        };

        let bytes = match encode_value(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot encode value for {}: {}", key, e);
                return false;
            }
        };

        match self.backend.set(key, bytes, self.resolve_ttl(ttl)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Memcached store of {} failed: {}", key, e);
                false
            }
        }
    }
}
