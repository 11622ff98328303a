//! Cache key validation.

use crate::error::{Error, Result};

/// Longest key memcached accepts, in bytes.
pub const MEMCACHED_MAX_KEY_LENGTH: usize = 250;

/// Rules a backend imposes on keys, checked before any backend call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyRules {
    /// Maximum key length in bytes, if any.
    pub max_length: Option<usize>,
    /// Reject ASCII whitespace and control characters.
    pub forbid_whitespace: bool,
}

impl KeyRules {
    /// Only the empty key is rejected.
    pub const PERMISSIVE: KeyRules = KeyRules {
        max_length: None,
        forbid_whitespace: false,
    };

    /// Memcached text protocol restrictions.
    pub const MEMCACHED: KeyRules = KeyRules {
        max_length: Some(MEMCACHED_MAX_KEY_LENGTH),
        forbid_whitespace: true,
    };

    /// Check `key` against these rules.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKey` describing the first violated rule.
    pub fn validate(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidKey("key must not be empty".to_string()));
        }

        if let Some(max) = self.max_length {
            if key.len() > max {
                return Err(Error::InvalidKey(format!(
                    "key is {} bytes, limit is {}",
                    key.len(),
                    max
                )));
            }
        }

        if self.forbid_whitespace {
            if let Some(c) = key
                .chars()
                .find(|c| c.is_ascii_whitespace() || c.is_control())
            {
                return Err(Error::InvalidKey(format!(
                    "key {:?} contains forbidden character {:?}",
                    key, c
                )));
            }
        }

        Ok(())
    }
}

impl Default for KeyRules {
    fn default() -> Self {
        KeyRules::PERMISSIVE
    }
}
