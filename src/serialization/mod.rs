//! Postcard-based value encoding with versioned envelopes.
//!
//! Every value the pool writes to a backend is wrapped in an envelope:
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (varint) │POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "CPOL"              u32                postcard::to_allocvec(V)
//! ```
//!
//! Decoding always yields an explicit `Result`. A stored `false`, `0` or empty
//! string decodes like any other value; only a decode *error* turns a fetch
//! into a miss.
//!
//! The format is not compatible with data written by other cache clients.
//! Foreign bytes fail the magic check and are treated as misses.
//!
//! # Example
//!
//! ```rust
//! use cache_pool::serialization::{decode_value, encode_value};
//!
//! # fn main() -> cache_pool::Result<()> {
//! let bytes = encode_value(&false)?;
//! let decoded: bool = decode_value(&bytes)?;
//! assert!(!decoded);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Magic header for pool entries: b"CPOL"
pub const CACHE_MAGIC: [u8; 4] = *b"CPOL";

/// Current schema version.
///
/// Bump when the layout of cached value types changes in a breaking way.
/// Entries written under another version are read as misses.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope for cache entries.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    /// Magic header: must be b"CPOL"
    pub magic: [u8; 4],
    /// Schema version: must match CURRENT_SCHEMA_VERSION
    pub version: u32,
    /// The cached value
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    /// Create a new envelope with current magic and version.
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Encode a value with envelope for backend storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if Postcard serialization fails.
pub fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let envelope = CacheEnvelope::new(value);
    postcard::to_allocvec(&envelope).map_err(|e| {
        error!("Cache serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Decode a value read from the backend.
///
/// Checks, in order: envelope shape, magic header, schema version.
///
/// # Errors
///
/// - `Error::DeserializationError`: corrupted or truncated bytes
/// - `Error::InvalidCacheEntry`: magic header mismatch
/// - `Error::VersionMismatch`: schema version mismatch
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let envelope: CacheEnvelope<T> = postcard::from_bytes(bytes).map_err(|e| {
        debug!("Cache deserialization failed: {}", e);
        Error::DeserializationError(e.to_string())
    })?;

    if envelope.magic != CACHE_MAGIC {
        warn!(
            "Invalid cache entry: expected magic {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        );
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        warn!(
            "Cache version mismatch: expected {}, got {}",
            CURRENT_SCHEMA_VERSION, envelope.version
        );
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}
