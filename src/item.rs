//! Cache item value object.

use crate::error::{Error, Result};
use std::time::{Duration, SystemTime};

/// Expiration metadata attached to an item before it is saved.
///
/// The item never enforces it; the pool turns it into a TTL at save time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiration {
    /// Expire this long after the save.
    After(Duration),
    /// Expire at an absolute point in time.
    At(SystemTime),
}

/// A key, an optional value and the hit state of the fetch that produced it.
///
/// Items returned by a pool on a miss carry no value. Items built by callers
/// start without a value and report `is_hit() == false` until fetched back.
///
/// # Example
///
/// ```
/// use cache_pool::CacheItem;
/// use std::time::Duration;
///
/// let mut item = CacheItem::new("user:1");
/// item.set("alice".to_string()).expires_after(Some(Duration::from_secs(60)));
///
/// assert_eq!(item.key(), "user:1");
/// assert_eq!(item.get().unwrap(), "alice");
/// assert!(!item.is_hit());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct CacheItem<V> {
    key: String,
    value: Option<V>,
    is_hit: bool,
    expiration: Option<Expiration>,
}

impl<V> CacheItem<V> {
    /// Create an empty item for `key`.
    pub fn new(key: impl Into<String>) -> Self {
        CacheItem {
            key: key.into(),
            value: None,
            is_hit: false,
            expiration: None,
        }
    }

    /// Item for a value found in the backend.
    pub(crate) fn hit(key: impl Into<String>, value: V) -> Self {
        CacheItem {
            key: key.into(),
            value: Some(value),
            is_hit: true,
            expiration: None,
        }
    }

    /// Builder form of [`CacheItem::set`].
    pub fn with_value(mut self, value: V) -> Self {
        self.value = Some(value);
        self
    }

    /// Builder form of [`CacheItem::expires_after`].
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expiration = Some(Expiration::After(ttl));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Store a payload. Does not change the hit state.
    pub fn set(&mut self, value: V) -> &mut Self {
        self.value = Some(value);
        self
    }

    /// Borrow the payload.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyValue` if no value was ever set, which is always
    /// the case for an item returned on a miss.
    pub fn get(&self) -> Result<&V> {
        self.value
            .as_ref()
            .ok_or_else(|| Error::EmptyValue(self.key.clone()))
    }

    /// Take the payload out of the item, if any.
    pub fn into_value(self) -> Option<V> {
        self.value
    }

    pub fn is_hit(&self) -> bool {
        self.is_hit
    }

    /// Expire `ttl` after the save. `None` clears any expiration, so the
    /// configured default applies.
    pub fn expires_after(&mut self, ttl: Option<Duration>) -> &mut Self {
        self.expiration = ttl.map(Expiration::After);
        self
    }

    /// Expire at `at`. `None` clears any expiration.
    pub fn expires_at(&mut self, at: Option<SystemTime>) -> &mut Self {
        self.expiration = at.map(Expiration::At);
        self
    }

    pub fn expiration(&self) -> Option<Expiration> {
        self.expiration
    }

    /// TTL requested by the expiration metadata, measured from `now`.
    ///
    /// - `None`: no metadata, the configured default applies
    /// - `Some(Ok(ttl))`: explicit TTL, zero meaning "never expires"
    /// - `Some(Err(()))`: the absolute expiration is already in the past
    pub(crate) fn requested_ttl(
        &self,
        now: SystemTime,
    ) -> Option<std::result::Result<Duration, ()>> {
        match self.expiration? {
            Expiration::After(ttl) => Some(Ok(ttl)),
            Expiration::At(at) => match at.duration_since(now) {
                Ok(remaining) if !remaining.is_zero() => Some(Ok(remaining)),
                _ => Some(Err(())),
            },
        }
    }
}
