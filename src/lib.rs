//! # cache-pool
//!
//! A typed, async cache-item pool with a Memcached adapter.
//!
//! ## Features
//!
//! - **Item pool:** get, save, deferred save, commit, delete and clear over [`CacheItem`]s
//! - **Typed values:** any `Serialize + DeserializeOwned` type, stored in a versioned envelope
//! - **Pluggable backends:** Memcached for production, an in-process store for tests
//! - **Never fails on outages:** backend errors become misses or `false`, and are logged
//! - **Injectable:** share one adapter across pools with `Arc`, no global singleton
//!
//! ## Quick Start
//!
//! ```no_run
//! use cache_pool::{CacheItem, CachePool, MemcachedAdapter, MemcachedConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> cache_pool::Result<()> {
//! // 1. Configure (or MemcachedConfig::from_env())
//! let config = MemcachedConfig::new("localhost", 11211)
//!     .with_time_to_live(300)
//!     .with_check_connection(true);
//!
//! // 2. Connect once, share everywhere
//! let adapter = Arc::new(MemcachedAdapter::new(config).await?);
//! let pool: CachePool<_, String> = CachePool::new(adapter);
//!
//! // 3. Use it
//! let item = CacheItem::new("greeting")
//!     .with_value("hello".to_string())
//!     .with_ttl(Duration::from_secs(60));
//! pool.save(&item).await?;
//!
//! let cached = pool.get_item("greeting").await?;
//! if cached.is_hit() {
//!     println!("{}", cached.get()?);
//! }
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod adapter;
pub mod backend;
pub mod config;
pub mod error;
pub mod item;
pub mod key;
pub mod observability;
pub mod pool;
pub mod serialization;
pub mod service;

// Re-exports for convenience
pub use adapter::{CacheAdapter, MemcachedAdapter};
pub use backend::CacheBackend;
pub use config::{Configuration, MemcachedConfig};
pub use error::{Error, Result};
pub use item::{CacheItem, Expiration};
pub use pool::CachePool;
pub use service::CacheService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
