//! Connection and TTL configuration.

use serde::Deserialize;
use std::fmt::Debug;
use std::time::Duration;

/// Default number of physical connections held by the memcached client.
/// One connection per process; concurrent callers queue on the pool.
/// Override with MEMCACHED_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: u32 = 1;

/// What an adapter needs to know about its server and default TTL.
///
/// Built by the application before the adapter and handed to it; may be
/// swapped later with `MemcachedAdapter::set_configuration`.
pub trait Configuration: Send + Sync + Debug {
    fn host(&self) -> &str;

    fn port(&self) -> u16;

    /// TTL applied when a save carries no expiration. Zero means the entry
    /// never expires.
    fn time_to_live(&self) -> Duration;

    /// Verify the server answers a stats request while constructing the
    /// adapter.
    fn should_check_connection(&self) -> bool;

    /// `host:port`, the form servers are keyed by in stats replies.
    fn address(&self) -> String {
        format!("{}:{}", self.host(), self.port())
    }
}

/// Configuration for the memcached adapter.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemcachedConfig {
    pub host: String,
    pub port: u16,
    /// Default TTL in seconds (0 = no expiration)
    pub time_to_live: u64,
    pub check_connection: bool,
    /// Upper bound for a single backend call, connection setup included
    #[serde(deserialize_with = "secs::deserialize")]
    pub connection_timeout: Duration,
    pub pool_size: u32,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        MemcachedConfig {
            host: "localhost".to_string(),
            port: 11211,
            time_to_live: 0,
            check_connection: false,
            connection_timeout: Duration::from_secs(5),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl MemcachedConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        MemcachedConfig {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_time_to_live(mut self, seconds: u64) -> Self {
        self.time_to_live = seconds;
        self
    }

    pub fn with_check_connection(mut self, check: bool) -> Self {
        self.check_connection = check;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Build configuration from environment variables.
    ///
    /// Reads `MEMCACHED_HOST`, `MEMCACHED_PORT`, `MEMCACHED_TTL`,
    /// `MEMCACHED_CHECK_CONNECTION`, `MEMCACHED_POOL_SIZE` and
    /// `MEMCACHED_TIMEOUT_SECS`. Missing or unparsable values keep their
    /// defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            name: &str,
        ) -> Option<T> {
            let raw = lookup(name)?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid {}={:?}", name, raw);
                    None
                }
            }
        }

        let defaults = MemcachedConfig::default();
        MemcachedConfig {
            host: lookup("MEMCACHED_HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "MEMCACHED_PORT").unwrap_or(defaults.port),
            time_to_live: parsed(&lookup, "MEMCACHED_TTL").unwrap_or(defaults.time_to_live),
            check_connection: parsed(&lookup, "MEMCACHED_CHECK_CONNECTION")
                .unwrap_or(defaults.check_connection),
            connection_timeout: parsed(&lookup, "MEMCACHED_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connection_timeout),
            pool_size: parsed(&lookup, "MEMCACHED_POOL_SIZE").unwrap_or(defaults.pool_size),
        }
    }
}

impl Configuration for MemcachedConfig {
    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn time_to_live(&self) -> Duration {
        Duration::from_secs(self.time_to_live)
    }

    fn should_check_connection(&self) -> bool {
        self.check_connection
    }
}

mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
