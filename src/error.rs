//! Error types for the cache pool.

use std::fmt;

/// Result type for cache pool operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the cache pool.
///
/// Only a few variants ever reach callers of [`crate::CachePool`]: key
/// validation failures, aggregated batch failures, and connection failures
/// while building an adapter. Everything the backend reports during a normal
/// operation is absorbed into a `false` result or a cache miss.
#[derive(Debug, Clone)]
pub enum Error {
    /// Connection verification failed while constructing an adapter.
    ///
    /// Raised only when the configuration asks for a connection check and the
    /// configured `host:port` does not answer a stats round-trip. No adapter
    /// is returned in that case.
    ConnectionError(String),

    /// Key rejected before reaching the backend.
    ///
    /// Empty keys are always rejected. Backends add their own rules, e.g.
    /// memcached refuses keys longer than 250 bytes or containing whitespace.
    InvalidKey(String),

    /// A cache item's value was read before one was set.
    ///
    /// Carries the item key.
    EmptyValue(String),

    /// Serialization failed when converting a value to cache bytes.
    SerializationError(String),

    /// Deserialization failed when converting cache bytes to a value.
    ///
    /// Seen by the pool as a cache miss, never propagated to callers.
    DeserializationError(String),

    /// Stored bytes do not carry the expected envelope magic.
    InvalidCacheEntry(String),

    /// Stored envelope was written with a different schema version.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from cached entry)
        found: u32,
    },

    /// Backend storage error (memcached, connection pool, etc).
    ///
    /// Common causes:
    /// - Connection lost or refused
    /// - No server registered on the client
    /// - Backend protocol error
    BackendError(String),

    /// Backend call exceeded the configured connection timeout.
    Timeout(String),

    /// Invalid configuration.
    ConfigError(String),

    /// A batch operation failed for some of its keys.
    PartialFailure {
        /// Keys whose individual operation failed
        failed: Vec<String>,
    },

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            Error::InvalidKey(msg) => write!(f, "Invalid key: {}", msg),
            Error::EmptyValue(key) => write!(f, "Cache item {} has no value", key),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::PartialFailure { failed } => {
                write!(f, "Operation failed for keys: {}", failed.join(", "))
            }
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<postcard::Error> for Error {
    fn from(e: postcard::Error) -> Self {
        match e {
            postcard::Error::SerializeBufferFull
            | postcard::Error::SerializeSeqLengthUnknown
            | postcard::Error::SerdeSerCustom => Error::SerializationError(e.to_string()),
            _ => Error::DeserializationError(e.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::BackendError(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}
