//! Cache item pool - the public get/save/delete/clear contract.

use crate::adapter::CacheAdapter;
use crate::error::{Error, Result};
use crate::item::CacheItem;
use crate::observability::{CacheMetrics, NoOpMetrics};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::sync::Mutex;

/// Pool of cache items holding values of type `V`.
///
/// The pool validates keys, resolves TTLs from item expiration metadata,
/// buffers deferred saves and drives the adapter hooks. Backend failures never
/// surface as errors: saves, deletes and clears report `false`, fetches report
/// a miss. `Err` is reserved for rejected keys and for batch deletes that
/// failed on some keys.
///
/// Several pools (one per value type) can share one adapter:
///
/// ```
/// use cache_pool::adapter::MemcachedAdapter;
/// use cache_pool::backend::InMemoryBackend;
/// use cache_pool::config::MemcachedConfig;
/// use cache_pool::{CacheItem, CachePool};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> cache_pool::Result<()> {
/// let config = MemcachedConfig::default().with_time_to_live(60);
/// let adapter = Arc::new(MemcachedAdapter::with_backend(config, InMemoryBackend::new()).await?);
/// let names: CachePool<_, String> = CachePool::new(adapter);
///
/// assert!(names.save(&CacheItem::new("user:1").with_value("alice".to_string())).await?);
///
/// let item = names.get_item("user:1").await?;
/// assert!(item.is_hit());
/// assert_eq!(item.get()?, "alice");
///
/// assert!(names.delete_item("user:1").await?);
/// assert!(!names.get_item("user:1").await?.is_hit());
/// # Ok(())
/// # }
/// ```
pub struct CachePool<A, V> {
    adapter: Arc<A>,
    deferred: Mutex<Vec<CacheItem<V>>>,
    metrics: Box<dyn CacheMetrics>,
}

impl<A, V> CachePool<A, V>
where
    A: CacheAdapter,
    V: Serialize + DeserializeOwned + Send + Sync,
{
    /// Create a pool on a shared adapter.
    pub fn new(adapter: Arc<A>) -> Self {
        CachePool {
            adapter,
            deferred: Mutex::new(Vec::new()),
            metrics: Box::new(NoOpMetrics),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    fn validate_key(&self, key: &str) -> Result<()> {
        self.adapter.key_rules().validate(key)
    }

    fn validate_keys<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        keys.iter().try_for_each(|key| self.validate_key(key.as_ref()))
    }

    fn record_fetch(&self, item: &CacheItem<V>, timer: Instant) {
        if item.is_hit() {
            self.metrics.record_hit(item.key(), timer.elapsed());
        } else {
            self.metrics.record_miss(item.key(), timer.elapsed());
        }
    }

    /// Fetch one item.
    ///
    /// Misses, backend errors and undecodable entries all come back as an
    /// item with `is_hit() == false`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKey` if the adapter rejects `key`.
    pub async fn get_item(&self, key: &str) -> Result<CacheItem<V>> {
        self.validate_key(key)?;

        let timer = Instant::now();
        let item = self.adapter.fetch_object(key).await;
        self.record_fetch(&item, timer);

        debug!("» GET {} -> {}", key, if item.is_hit() { "HIT" } else { "MISS" });
        Ok(item)
    }

    /// Fetch several items in one batch.
    ///
    /// The map holds exactly one entry per distinct requested key, hit or
    /// miss.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKey` if any key is rejected; nothing is fetched
    /// in that case.
    pub async fn get_items<K: AsRef<str>>(
        &self,
        keys: &[K],
    ) -> Result<HashMap<String, CacheItem<V>>> {
        self.validate_keys(keys)?;

        let mut seen = HashSet::with_capacity(keys.len());
        let unique: Vec<&str> = keys
            .iter()
            .map(|key| key.as_ref())
            .filter(|key| seen.insert(*key))
            .collect();

        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let timer = Instant::now();
        let items = self.adapter.fetch_multi_objects(&unique).await;
        for item in items.values() {
            self.record_fetch(item, timer);
        }

        debug!(
            "» GET_MULTI {} keys -> {} hits",
            unique.len(),
            items.values().filter(|item| item.is_hit()).count()
        );
        Ok(items)
    }

    /// Whether `key` currently holds a decodable value.
    ///
    /// Deferred saves are not consulted.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKey` if the adapter rejects `key`.
    pub async fn has_item(&self, key: &str) -> Result<bool> {
        Ok(self.get_item(key).await?.is_hit())
    }

    /// Remove every entry from the backend and drop pending deferred saves.
    ///
    /// The flush hits the whole backend keyspace, not just this pool's keys.
    pub async fn clear(&self) -> bool {
        let mut queue = self.deferred.lock().await;
        if !queue.is_empty() {
            debug!("Discarding {} deferred saves before clear", queue.len());
            queue.clear();
        }

        let cleared = self.adapter.clear_all_objects().await;
        if !cleared {
            self.metrics.record_error("*", "clear failed");
        }
        cleared
    }

    /// Remove one entry.
    ///
    /// Pending deferred saves are committed first so a queued write cannot
    /// bring the key back afterwards. The deferred queue stays locked until
    /// the delete is done, so a commit running in another task cannot land
    /// its writes after it. An absent key counts as success.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKey` if the adapter rejects `key`.
    pub async fn delete_item(&self, key: &str) -> Result<bool> {
        self.validate_key(key)?;

        let mut queue = self.deferred.lock().await;
        self.commit_queue(&mut queue).await;

        Ok(self.remove(key).await)
    }

    /// Remove several entries, attempting every key.
    ///
    /// Commits pending deferred saves first, like [`CachePool::delete_item`].
    ///
    /// # Errors
    ///
    /// - `Error::InvalidKey`: a key was rejected; nothing was deleted
    /// - `Error::PartialFailure`: the listed keys could not be deleted
    pub async fn delete_items<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        self.validate_keys(keys)?;

        let mut queue = self.deferred.lock().await;
        self.commit_queue(&mut queue).await;

        let mut failed = Vec::new();
        for key in keys {
            let key = key.as_ref();
            if !self.remove(key).await {
                failed.push(key.to_string());
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            warn!("Delete failed for {} of {} keys", failed.len(), keys.len());
            Err(Error::PartialFailure { failed })
        }
    }

    /// Write an item now.
    ///
    /// TTL comes from the item's expiration metadata, else from the adapter's
    /// configured default. An item whose absolute expiration has already
    /// passed is not written; its key is deleted instead.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKey` if the adapter rejects the item key.
    pub async fn save(&self, item: &CacheItem<V>) -> Result<bool> {
        self.validate_key(item.key())?;
        Ok(self.store(item).await)
    }

    /// Queue an item until the next [`CachePool::commit`].
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKey` if the adapter rejects the item key.
    pub async fn save_deferred(&self, item: CacheItem<V>) -> Result<bool> {
        self.validate_key(item.key())?;

        debug!("» DEFER {}", item.key());
        self.deferred.lock().await.push(item);
        Ok(true)
    }

    /// Write every deferred item in the order it was queued.
    ///
    /// Returns `true` if all writes succeeded, including when nothing was
    /// queued. The queue is emptied either way; failed items are dropped.
    ///
    /// The queue stays locked while the writes run, so deletes and clears
    /// from other tasks wait for them.
    pub async fn commit(&self) -> bool {
        let mut queue = self.deferred.lock().await;
        self.commit_queue(&mut queue).await
    }

    async fn commit_queue(&self, queue: &mut Vec<CacheItem<V>>) -> bool {
        let queued = std::mem::take(queue);
        if queued.is_empty() {
            return true;
        }

        let mut failed = 0;
        for item in &queued {
            if !self.store(item).await {
                failed += 1;
            }
        }

        if failed > 0 {
            warn!(
                "Commit dropped {} of {} deferred saves",
                failed,
                queued.len()
            );
        } else {
            debug!("✓ Committed {} deferred saves", queued.len());
        }
        failed == 0
    }

    /// Number of deferred saves waiting for a commit.
    pub async fn pending(&self) -> usize {
        self.deferred.lock().await.len()
    }

    async fn store(&self, item: &CacheItem<V>) -> bool {
        let timer = Instant::now();
        let key = item.key();

        let stored = match item.requested_ttl(SystemTime::now()) {
            Some(Err(())) => {
                debug!("{} expired before save, deleting instead", key);
                self.adapter.clear_one_object(key).await
            }
            Some(Ok(ttl)) => self.adapter.store_item(key, item, Some(ttl)).await,
            None => self.adapter.store_item(key, item, None).await,
        };

        if stored {
            self.metrics.record_set(key, timer.elapsed());
        } else {
            self.metrics.record_error(key, "save failed");
        }
        stored
    }

    async fn remove(&self, key: &str) -> bool {
        let timer = Instant::now();
        let removed = self.adapter.clear_one_object(key).await;

        if removed {
            self.metrics.record_delete(key, timer.elapsed());
        } else {
            self.metrics.record_error(key, "delete failed");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemcachedAdapter;
    use crate::backend::{CacheBackend, InMemoryBackend};
    use crate::config::MemcachedConfig;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    type TestPool<V> = CachePool<MemcachedAdapter<InMemoryBackend>, V>;

    async fn pool<V>(ttl: u64) -> TestPool<V>
    where
        V: Serialize + DeserializeOwned + Send + Sync,
    {
        let config = MemcachedConfig::default().with_time_to_live(ttl);
        let adapter = MemcachedAdapter::with_backend(config, InMemoryBackend::new())
            .await
            .expect("Failed to build adapter");
        CachePool::new(Arc::new(adapter))
    }

    fn backend<V>(pool: &TestPool<V>) -> &InMemoryBackend {
        pool.adapter.backend()
    }

    #[derive(Default)]
    struct RecordingMetrics {
        events: Arc<StdMutex<Vec<String>>>,
    }

    impl CacheMetrics for RecordingMetrics {
        fn record_hit(&self, key: &str, _duration: Duration) {
            self.events.lock().unwrap().push(format!("hit:{}", key));
        }
        fn record_miss(&self, key: &str, _duration: Duration) {
            self.events.lock().unwrap().push(format!("miss:{}", key));
        }
        fn record_set(&self, key: &str, _duration: Duration) {
            self.events.lock().unwrap().push(format!("set:{}", key));
        }
        fn record_delete(&self, key: &str, _duration: Duration) {
            self.events.lock().unwrap().push(format!("delete:{}", key));
        }
        fn record_error(&self, key: &str, _error: &str) {
            self.events.lock().unwrap().push(format!("error:{}", key));
        }
    }

    /// Adapter that gives other tasks a turn before every write.
    struct YieldingAdapter {
        inner: MemcachedAdapter<InMemoryBackend>,
    }

    impl CacheAdapter for YieldingAdapter {
        fn key_rules(&self) -> crate::key::KeyRules {
            self.inner.key_rules()
        }

        async fn fetch_object<T>(&self, key: &str) -> CacheItem<T>
        where
            T: DeserializeOwned + Send,
        {
            self.inner.fetch_object(key).await
        }

        async fn fetch_multi_objects<T>(&self, keys: &[&str]) -> HashMap<String, CacheItem<T>>
        where
            T: DeserializeOwned + Send,
        {
            self.inner.fetch_multi_objects(keys).await
        }

        async fn clear_all_objects(&self) -> bool {
            self.inner.clear_all_objects().await
        }

        async fn clear_one_object(&self, key: &str) -> bool {
            self.inner.clear_one_object(key).await
        }

        async fn store_item<T>(&self, key: &str, item: &CacheItem<T>, ttl: Option<Duration>) -> bool
        where
            T: Serialize + Sync,
        {
            tokio::task::yield_now().await;
            self.inner.store_item(key, item, ttl).await
        }
    }

    async fn yielding_pool() -> CachePool<YieldingAdapter, u32> {
        let inner = MemcachedAdapter::with_backend(MemcachedConfig::default(), InMemoryBackend::new())
            .await
            .expect("Failed to build adapter");
        CachePool::new(Arc::new(YieldingAdapter { inner }))
    }

    #[tokio::test]
    async fn test_get_item_rejects_invalid_keys() {
        let pool: TestPool<String> = pool(0).await;
        assert!(matches!(pool.get_item("").await, Err(Error::InvalidKey(_))));
        assert!(matches!(
            pool.get_item("has space").await,
            Err(Error::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_save_then_get() {
        let pool: TestPool<String> = pool(60).await;
        let item = CacheItem::new("user:1").with_value("alice".to_string());

        assert!(pool.save(&item).await.unwrap());

        let fetched = pool.get_item("user:1").await.unwrap();
        assert!(fetched.is_hit());
        assert_eq!(fetched.get().unwrap(), "alice");
    }

    #[tokio::test]
    async fn test_stored_false_is_a_hit() {
        let pool: TestPool<bool> = pool(0).await;
        assert!(pool
            .save(&CacheItem::new("flag").with_value(false))
            .await
            .unwrap());

        let fetched = pool.get_item("flag").await.unwrap();
        assert!(fetched.is_hit());
        assert!(!*fetched.get().unwrap());
    }

    #[tokio::test]
    async fn test_save_item_without_value_fails() {
        let pool: TestPool<String> = pool(0).await;
        assert!(!pool.save(&CacheItem::new("empty")).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_key() {
        let pool: TestPool<u32> = pool(0).await;
        let item = CacheItem::new("").with_value(1);
        assert!(matches!(pool.save(&item).await, Err(Error::InvalidKey(_))));
        assert!(matches!(
            pool.save_deferred(item).await,
            Err(Error::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_save_expired_item_deletes_key() {
        let pool: TestPool<u32> = pool(0).await;
        assert!(pool.save(&CacheItem::new("k").with_value(1)).await.unwrap());

        let mut stale = CacheItem::new("k").with_value(2);
        stale.expires_at(Some(SystemTime::now() - Duration::from_secs(5)));
        assert!(pool.save(&stale).await.unwrap());

        assert!(!pool.has_item("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_save_ttl_sources() {
        let pool: TestPool<u32> = pool(60).await;

        let default_item = CacheItem::new("default").with_value(1);
        let forever_item = CacheItem::new("forever").with_value(1).with_ttl(Duration::ZERO);
        let mut dated_item = CacheItem::new("dated").with_value(1);
        dated_item.expires_at(Some(SystemTime::now() + Duration::from_secs(600)));

        assert!(pool.save(&default_item).await.unwrap());
        assert!(pool.save(&forever_item).await.unwrap());
        assert!(pool.save(&dated_item).await.unwrap());

        let backend = backend(&pool);
        let default_ttl = backend.ttl("default").flatten().expect("default ttl");
        assert!(default_ttl <= Duration::from_secs(60));
        assert_eq!(backend.ttl("forever"), Some(None));
        let dated_ttl = backend.ttl("dated").flatten().expect("dated ttl");
        assert!(dated_ttl > Duration::from_secs(500));
    }

    #[tokio::test]
    async fn test_get_items_one_entry_per_key() {
        let pool: TestPool<u32> = pool(0).await;
        assert!(pool.save(&CacheItem::new("a").with_value(1)).await.unwrap());

        let items = pool.get_items(&["a", "b", "c", "a"]).await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items["a"].get().unwrap(), &1);
        assert!(!items["b"].is_hit());
        assert!(!items["c"].is_hit());
    }

    #[tokio::test]
    async fn test_get_items_empty_request() {
        let pool: TestPool<u32> = pool(0).await;
        let keys: [&str; 0] = [];
        assert!(pool.get_items(&keys).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_items_rejects_any_invalid_key() {
        let pool: TestPool<u32> = pool(0).await;
        assert!(matches!(
            pool.get_items(&["a", ""]).await,
            Err(Error::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_has_item_ignores_deferred_queue() {
        let pool: TestPool<u32> = pool(0).await;
        pool.save_deferred(CacheItem::new("k").with_value(1))
            .await
            .unwrap();

        assert!(!pool.has_item("k").await.unwrap());
        assert_eq!(pool.pending().await, 1);
    }

    #[tokio::test]
    async fn test_commit_writes_deferred_in_order() {
        let pool: TestPool<u32> = pool(0).await;
        pool.save_deferred(CacheItem::new("k").with_value(1))
            .await
            .unwrap();
        pool.save_deferred(CacheItem::new("k").with_value(2))
            .await
            .unwrap();

        assert!(pool.commit().await);
        assert_eq!(pool.pending().await, 0);
        assert_eq!(pool.get_item("k").await.unwrap().get().unwrap(), &2);
    }

    #[tokio::test]
    async fn test_commit_empty_queue() {
        let pool: TestPool<u32> = pool(0).await;
        assert!(pool.commit().await);
        assert!(pool.commit().await);
    }

    #[tokio::test]
    async fn test_commit_failure_empties_queue() {
        let pool: TestPool<u32> = pool(0).await;
        pool.save_deferred(CacheItem::new("k").with_value(1))
            .await
            .unwrap();
        backend(&pool).set_reachable(false);

        assert!(!pool.commit().await);
        assert_eq!(pool.pending().await, 0);
    }

    #[tokio::test]
    async fn test_delete_commits_deferred_first() {
        let pool: TestPool<u32> = pool(0).await;
        pool.save_deferred(CacheItem::new("k").with_value(1))
            .await
            .unwrap();
        pool.save_deferred(CacheItem::new("other").with_value(2))
            .await
            .unwrap();

        assert!(pool.delete_item("k").await.unwrap());

        assert_eq!(pool.pending().await, 0);
        assert!(!pool.has_item("k").await.unwrap());
        assert!(pool.has_item("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_waits_for_running_commit() {
        let pool = yielding_pool().await;
        pool.save_deferred(CacheItem::new("k").with_value(1))
            .await
            .unwrap();

        let (committed, deleted) = tokio::join!(pool.commit(), pool.delete_item("k"));

        assert!(committed);
        assert!(deleted.unwrap());
        assert!(!pool.has_item("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_items_waits_for_running_commit() {
        let pool = yielding_pool().await;
        for key in ["a", "b"] {
            pool.save_deferred(CacheItem::new(key).with_value(1))
                .await
                .unwrap();
        }

        let (committed, deleted) = tokio::join!(pool.commit(), pool.delete_items(&["a", "b"]));

        assert!(committed);
        assert!(deleted.is_ok());
        assert!(!pool.has_item("a").await.unwrap());
        assert!(!pool.has_item("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_waits_for_running_commit() {
        let pool = yielding_pool().await;
        pool.save_deferred(CacheItem::new("k").with_value(1))
            .await
            .unwrap();

        let (committed, cleared) = tokio::join!(pool.commit(), pool.clear());

        assert!(committed);
        assert!(cleared);
        assert!(!pool.has_item("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_absent_key() {
        let pool: TestPool<u32> = pool(0).await;
        assert!(pool.delete_item("never-saved").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_items_reports_failures() {
        let pool: TestPool<u32> = pool(0).await;
        assert!(pool.save(&CacheItem::new("a").with_value(1)).await.unwrap());
        assert!(pool.delete_items(&["a", "b"]).await.is_ok());

        backend(&pool).set_reachable(false);
        match pool.delete_items(&["a", "b"]).await {
            Err(Error::PartialFailure { failed }) => {
                assert_eq!(failed, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("Expected PartialFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clear_drops_entries_and_queue() {
        let pool: TestPool<u32> = pool(0).await;
        assert!(pool.save(&CacheItem::new("a").with_value(1)).await.unwrap());
        pool.save_deferred(CacheItem::new("b").with_value(2))
            .await
            .unwrap();

        assert!(pool.clear().await);
        assert_eq!(pool.pending().await, 0);
        assert!(!pool.has_item("a").await.unwrap());
        assert!(pool.commit().await);
        assert!(!pool.has_item("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_backend_outage_is_absorbed() {
        let pool: TestPool<u32> = pool(0).await;
        assert!(pool.save(&CacheItem::new("a").with_value(1)).await.unwrap());
        backend(&pool).set_reachable(false);

        assert!(!pool.get_item("a").await.unwrap().is_hit());
        assert!(!pool.save(&CacheItem::new("a").with_value(2)).await.unwrap());
        assert!(!pool.delete_item("a").await.unwrap());
        assert!(!pool.clear().await);

        backend(&pool).set_reachable(true);
        assert_eq!(pool.get_item("a").await.unwrap().get().unwrap(), &1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss() {
        let pool: TestPool<String> = pool(0).await;
        backend(&pool)
            .set("k", vec![0xff, 0x00, 0x13], None)
            .await
            .expect("Failed to set");

        let item = pool.get_item("k").await.unwrap();
        assert!(!item.is_hit());
        assert!(matches!(item.get(), Err(Error::EmptyValue(_))));
    }

    #[tokio::test]
    async fn test_metrics_hooks() {
        let metrics = RecordingMetrics::default();
        let events = metrics.events.clone();
        let pool: TestPool<u32> = pool(0).await.with_metrics(Box::new(metrics));

        pool.get_item("a").await.unwrap();
        pool.save(&CacheItem::new("a").with_value(1)).await.unwrap();
        pool.get_item("a").await.unwrap();
        pool.delete_item("a").await.unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["miss:a", "set:a", "hit:a", "delete:a"]
        );
    }
}
