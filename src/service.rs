//! Shared cache handle for applications.
//!
//! Wraps a [`CachePool`] in an `Arc` so one pool can be handed to every
//! request handler or task without an outer `Arc<Mutex<>>`.

use crate::adapter::CacheAdapter;
use crate::error::Result;
use crate::item::CacheItem;
use crate::observability::CacheMetrics;
use crate::pool::CachePool;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Cloneable handle to one cache pool.
///
/// Adapters and backends use interior mutability and the pool keeps its
/// deferred queue behind an async mutex, so every method takes `&self` and
/// clones are cheap `Arc` increments sharing the same queue.
///
/// The service replaces any process-wide cache singleton: build the adapter
/// once at startup and pass services (or the adapter `Arc`) to the code that
/// needs them.
///
/// # Example
///
/// ```
/// use cache_pool::adapter::MemcachedAdapter;
/// use cache_pool::backend::InMemoryBackend;
/// use cache_pool::config::MemcachedConfig;
/// use cache_pool::{CacheItem, CacheService};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> cache_pool::Result<()> {
/// let adapter = Arc::new(
///     MemcachedAdapter::with_backend(MemcachedConfig::default(), InMemoryBackend::new()).await?,
/// );
///
/// let sessions: CacheService<_, Vec<u64>> = CacheService::new(adapter);
/// let handle = sessions.clone();
///
/// handle.save(&CacheItem::new("session:7").with_value(vec![1, 2, 3])).await?;
/// assert!(sessions.has_item("session:7").await?);
/// # Ok(())
/// # }
/// ```
pub struct CacheService<A, V> {
    pool: Arc<CachePool<A, V>>,
}

impl<A, V> Clone for CacheService<A, V> {
    fn clone(&self) -> Self {
        CacheService {
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<A, V> CacheService<A, V>
where
    A: CacheAdapter,
    V: Serialize + DeserializeOwned + Send + Sync,
{
    /// Create a service over a shared adapter.
    pub fn new(adapter: Arc<A>) -> Self {
        CacheService {
            pool: Arc::new(CachePool::new(adapter)),
        }
    }

    /// Create a new cache service with custom metrics.
    pub fn with_metrics(adapter: Arc<A>, metrics: Box<dyn CacheMetrics>) -> Self {
        CacheService {
            pool: Arc::new(CachePool::new(adapter).with_metrics(metrics)),
        }
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &CachePool<A, V> {
        &self.pool
    }

    /// See [`CachePool::get_item`].
    pub async fn get_item(&self, key: &str) -> Result<CacheItem<V>> {
        self.pool.get_item(key).await
    }

    /// See [`CachePool::get_items`].
    pub async fn get_items<K: AsRef<str>>(
        &self,
        keys: &[K],
    ) -> Result<HashMap<String, CacheItem<V>>> {
        self.pool.get_items(keys).await
    }

    pub async fn has_item(&self, key: &str) -> Result<bool> {
        self.pool.has_item(key).await
    }

    pub async fn save(&self, item: &CacheItem<V>) -> Result<bool> {
        self.pool.save(item).await
    }

    pub async fn save_deferred(&self, item: CacheItem<V>) -> Result<bool> {
        self.pool.save_deferred(item).await
    }

    pub async fn commit(&self) -> bool {
        self.pool.commit().await
    }

    pub async fn delete_item(&self, key: &str) -> Result<bool> {
        self.pool.delete_item(key).await
    }

    pub async fn delete_items<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        self.pool.delete_items(keys).await
    }

    pub async fn clear(&self) -> bool {
        self.pool.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemcachedAdapter;
    use crate::backend::InMemoryBackend;
    use crate::config::MemcachedConfig;
    use serde::Deserialize;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: u64,
        name: String,
    }

    type TestAdapter = MemcachedAdapter<InMemoryBackend>;

    async fn adapter() -> Arc<TestAdapter> {
        Arc::new(
            MemcachedAdapter::with_backend(MemcachedConfig::default(), InMemoryBackend::new())
                .await
                .expect("Failed to create adapter"),
        )
    }

    #[tokio::test]
    async fn test_cache_service_save_and_get() {
        let service: CacheService<_, Profile> = CacheService::new(adapter().await);
        let alice = Profile {
            id: 1,
            name: "alice".to_string(),
        };

        assert!(service
            .save(&CacheItem::new("profile:1").with_value(alice.clone()))
            .await
            .expect("Failed to save"));

        let item = service.get_item("profile:1").await.expect("Failed to get");
        assert!(item.is_hit());
        assert_eq!(item.get().expect("value missing"), &alice);
    }

    #[tokio::test]
    async fn test_cache_service_clone() {
        let service1: CacheService<_, String> = CacheService::new(adapter().await);
        let service2 = service1.clone();

        // Both services share the same pool and deferred queue
        assert!(Arc::ptr_eq(&service1.pool, &service2.pool));

        service1
            .save_deferred(CacheItem::new("k").with_value("v".to_string()))
            .await
            .expect("Failed to defer");
        assert_eq!(service2.pool().pending().await, 1);
        assert!(service2.commit().await);
        assert!(service1.has_item("k").await.expect("Failed to check"));
    }

    #[tokio::test]
    async fn test_cache_services_share_adapter() {
        let adapter = adapter().await;
        let numbers: CacheService<_, u32> = CacheService::new(Arc::clone(&adapter));
        let names: CacheService<_, String> = CacheService::new(Arc::clone(&adapter));

        numbers
            .save(&CacheItem::new("n").with_value(7))
            .await
            .expect("Failed to save");

        // Another value type sees the entry but cannot decode it
        assert!(!names.has_item("n").await.expect("Failed to check"));
        assert!(names.clear().await);
        assert!(!numbers.has_item("n").await.expect("Failed to check"));
    }

    #[tokio::test]
    async fn test_cache_service_delete_items() {
        let service: CacheService<_, u8> = CacheService::new(adapter().await);
        for key in ["a", "b"] {
            service
                .save(&CacheItem::new(key).with_value(1))
                .await
                .expect("Failed to save");
        }

        service
            .delete_items(&["a", "b", "never-saved"])
            .await
            .expect("Failed to delete");
        let items = service.get_items(&["a", "b"]).await.expect("Failed to get");
        assert!(items.values().all(|item| !item.is_hit()));
    }

    #[tokio::test]
    async fn test_cache_service_thread_safety() {
        let service: CacheService<_, String> = CacheService::new(adapter().await);

        let mut handles = vec![];

        for i in 0..5 {
            let service_clone = service.clone();
            let handle = tokio::spawn(async move {
                let key = format!("task:{}", i);
                service_clone
                    .save(&CacheItem::new(key.clone()).with_value(format!("value_{}", i)))
                    .await
                    .expect("Failed to save");

                let item = service_clone.get_item(&key).await.expect("Failed to get");
                assert!(item.is_hit());
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.await.expect("Task failed");
        }

        let keys: Vec<String> = (0..5).map(|i| format!("task:{}", i)).collect();
        let items = service.get_items(&keys).await.expect("Failed to get");
        assert_eq!(items.len(), 5);
        assert!(items.values().all(CacheItem::is_hit));
    }
}
