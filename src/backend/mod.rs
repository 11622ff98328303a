//! Remote key-value client implementations.
//!
//! A [`CacheBackend`] is the wire-level collaborator of an adapter: it moves
//! raw bytes to and from a caching server and knows nothing about items,
//! encoding or default TTLs.

use crate::error::Result;
use std::collections::HashMap;
use std::time::Duration;

pub mod inmemory;
#[cfg(feature = "memcached")]
pub mod memcached;

pub use inmemory::InMemoryBackend;
#[cfg(feature = "memcached")]
pub use memcached::MemcachedBackend;

/// Per-server statistics, keyed by `host:port`.
pub type ServerStats = HashMap<String, HashMap<String, String>>;

/// Trait for remote cache clients.
///
/// **IMPORTANT:** All methods use `&self` so one client can be shared by every
/// caller. Implementations use interior mutability and `Clone` must share the
/// underlying connection rather than open a new one.
///
/// **ASYNC:** All data methods are async and must be awaited.
#[allow(async_fn_in_trait)]
pub trait CacheBackend: Send + Sync + Clone {
    /// Register a server endpoint.
    ///
    /// # Errors
    /// Returns `Err` if the endpoint cannot be registered
    fn add_server(&self, host: &str, port: u16) -> Result<()>;

    /// Registered endpoints as `host:port`, in registration order.
    fn server_list(&self) -> Vec<String>;

    /// Retrieve value by key.
    ///
    /// # Returns
    /// - `Ok(Some(bytes))` - Value found
    /// - `Ok(None)` - Key not found
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs (connection lost, etc.)
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store value with optional TTL.
    ///
    /// # Arguments
    /// - `key`: Cache key
    /// - `value`: Encoded bytes
    /// - `ttl`: Time-to-live. None = never expires
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Remove value.
    ///
    /// # Returns
    /// - `Ok(true)` - Key existed and was removed
    /// - `Ok(false)` - Key was not found
    ///
    /// # Errors
    /// Returns `Err` for any failure other than "not found"
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Bulk get preserving request order: one slot per requested key.
    ///
    /// Default implementation calls `get()` for each key.
    ///
    /// # Errors
    /// Returns `Err` if backend error occurs
    async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await?);
        }
        Ok(results)
    }

    /// Remove every entry on every server.
    ///
    /// # Errors
    /// Returns `Err` if the flush fails
    async fn clear_all(&self) -> Result<()>;

    /// Statistics for every server that answered.
    ///
    /// # Errors
    /// Returns `Err` if no server could be queried
    async fn stats(&self) -> Result<ServerStats>;
}
