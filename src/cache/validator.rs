//! Plausibility checks for cached and freshly fetched payloads.
//!
//! The backend can return transient empty results under load without signaling
//! an error, so "zero items" is treated as suspicious unless the key is on the
//! known-empty allowlist.

use std::collections::HashSet;

/// Decides whether a payload of `item_count` items looks correct for `key`.
///
/// Implementations must be pure: no I/O and the same answer for the same
/// inputs.
pub trait PlausibilityCheck: Send + Sync {
    /// `false` means the payload is suspicious and should not be trusted.
    fn is_plausible(&self, key: &str, item_count: usize) -> bool;

    /// Whether an empty result is legitimate for `key`.
    fn is_known_empty(&self, key: &str) -> bool;
}

/// Allowlist-driven validator.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    known_empty: HashSet<String>,
}

impl Validator {
    pub fn new<I, S>(known_empty_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_empty: known_empty_keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Allowlisted keys, sorted.
    pub fn known_empty_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.known_empty.iter().cloned().collect();
        keys.sort();
        keys
    }
}

impl PlausibilityCheck for Validator {
    fn is_plausible(&self, key: &str, item_count: usize) -> bool {
        item_count > 0 || self.is_known_empty(key)
    }

    fn is_known_empty(&self, key: &str) -> bool {
        self.known_empty.contains(key)
    }
}
