//! Backend hooks behind the cache pool.
//!
//! A [`CacheAdapter`] performs the backend-specific half of every pool
//! operation. [`crate::CachePool`] owns the shared half (key validation,
//! deferred saves, TTL resolution from item metadata, batch bookkeeping) and
//! is the only intended caller of these hooks.
//!
//! Hooks never fail: backend errors are logged and reported as `false` or as
//! a miss.

use crate::item::CacheItem;
use crate::key::KeyRules;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

pub mod memcached;

pub use memcached::MemcachedAdapter;

/// Backend-specific steps of the pool contract.
#[allow(async_fn_in_trait)]
pub trait CacheAdapter: Send + Sync {
    /// Key restrictions of this backend. Empty keys are always rejected.
    fn key_rules(&self) -> KeyRules {
        KeyRules::PERMISSIVE
    }

    /// Fetch and decode one value.
    ///
    /// A missing key, a backend error and undecodable bytes all yield an item
    /// with `is_hit() == false` and no value.
    async fn fetch_object<V>(&self, key: &str) -> CacheItem<V>
    where
        V: DeserializeOwned + Send;

    /// Fetch and decode several values in one batch.
    ///
    /// The map holds exactly one item per distinct requested key.
    async fn fetch_multi_objects<V>(&self, keys: &[&str]) -> HashMap<String, CacheItem<V>>
    where
        V: DeserializeOwned + Send;

    /// Remove every entry from the backend.
    async fn clear_all_objects(&self) -> bool;

    /// Remove one entry. An absent key counts as success.
    async fn clear_one_object(&self, key: &str) -> bool;

    /// Encode `item`'s value and write it under `key`.
    ///
    /// `ttl` of `None` means "use the configured default"; `Some(ZERO)` means
    /// "never expires". Items without a value are not written.
    async fn store_item<V>(&self, key: &str, item: &CacheItem<V>, ttl: Option<Duration>) -> bool
    where
        V: Serialize + Sync;
}
