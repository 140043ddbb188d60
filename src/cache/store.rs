//! In-memory cache store with per-entry TTL.
//!
//! Backed by a sharded concurrent map, so mutations are atomic per key and
//! readers of one key never wait on writers of another. Expired entries are
//! evicted lazily by [`CacheStore::get`] and eagerly by
//! [`CacheStore::purge_expired`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// A single cached query result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Resource key this entry belongs to.
    pub key: String,
    /// The query result.
    pub payload: Arc<Value>,
    /// Size signal extracted from the payload when it was fetched.
    pub item_count: usize,
    /// When the entry was written.
    pub stored_at: DateTime<Utc>,
    /// How long the entry stays fresh.
    pub ttl: Duration,
}

impl CacheEntry {
    /// `None` when `stored_at + ttl` is not representable; such an entry never expires.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.stored_at.checked_add_signed(ttl))
    }

    /// Expired at any instant `>= stored_at + ttl`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expiry| now >= expiry)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Per-key summary for administrative reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySummary {
    pub key: String,
    pub item_count: usize,
    pub stored_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
}

/// Concurrent key -> entry store.
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl CacheStore {
    /// Create an empty store stamping every `put` with `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// TTL applied to new entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a fresh entry, or `None` if absent or expired.
    ///
    /// An expired entry is removed as a side effect. The removal is conditional
    /// on the entry still being expired, so a concurrent `put` is never lost.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = Utc::now();
        let entry = self.entries.get(key).map(|e| e.value().clone())?;
        if entry.is_expired_at(now) {
            debug!(key = %key, "Cache entry expired, removing");
            self.entries.remove_if(key, |_, e| e.is_expired_at(now));
            return None;
        }
        Some(entry)
    }

    /// Return a copy of the entry regardless of TTL. Never evicts.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Store `payload`, replacing any existing entry for `key`.
    pub fn put(&self, key: &str, payload: impl Into<Arc<Value>>, item_count: usize) {
        let entry = CacheEntry {
            key: key.to_string(),
            payload: payload.into(),
            item_count,
            stored_at: Utc::now(),
            ttl: self.ttl,
        };
        self.entries.insert(key.to_string(), entry);
    }

    /// Remove the entry for `key`. Returns `true` if one was present.
    pub fn evict(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove the entry for `key` only if `predicate` holds for it, atomically.
    pub fn evict_if<F>(&self, key: &str, predicate: F) -> bool
    where
        F: FnOnce(&CacheEntry) -> bool,
    {
        self.entries
            .remove_if(key, |_, entry| predicate(entry))
            .is_some()
    }

    /// Snapshot of held keys, sorted.
    pub fn list_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Remove every entry. Returns the number removed.
    pub fn clear_all(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Remove all expired entries and return their keys.
    pub fn purge_expired(&self) -> Vec<String> {
        let now = Utc::now();
        let mut purged = Vec::new();
        self.entries.retain(|key, entry| {
            if entry.is_expired_at(now) {
                purged.push(key.clone());
                false
            } else {
                true
            }
        });
        purged.sort();
        purged
    }

    /// Per-key item counts and freshness, sorted by key.
    pub fn summaries(&self) -> Vec<EntrySummary> {
        let now = Utc::now();
        let mut out: Vec<EntrySummary> = self
            .entries
            .iter()
            .map(|e| EntrySummary {
                key: e.key().clone(),
                item_count: e.item_count,
                stored_at: e.stored_at,
                expires_at: e.expires_at(),
                expired: e.is_expired_at(now),
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shift an entry's `stored_at` into the past.
    #[cfg(test)]
    pub(crate) fn backdate(&self, key: &str, by: Duration) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.stored_at -= chrono::Duration::from_std(by).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn roster(n: usize) -> Value {
        json!({ "students": (0..n).map(|i| json!({ "id": i })).collect::<Vec<_>>() })
    }

    #[test]
    fn test_put_then_get() {
        let store = CacheStore::new(DAY);
        store.put("students:batch23-27", roster(258), 258);
        let entry = store.get("students:batch23-27").unwrap();
        assert_eq!(entry.key, "students:batch23-27");
        assert_eq!(entry.item_count, 258);
        assert_eq!(entry.ttl, DAY);
        assert_eq!(entry.payload["students"].as_array().unwrap().len(), 258);
    }

    #[test]
    fn test_get_missing() {
        let store = CacheStore::new(DAY);
        assert!(store.get("nope").is_none());
    }

    #[test]
    fn test_put_overwrites() {
        let store = CacheStore::new(DAY);
        store.put("k", roster(0), 0);
        store.put("k", roster(3), 3);
        assert_eq!(store.get("k").unwrap().item_count, 3);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ttl_expiry_exactly_at_boundary() {
        let store = CacheStore::new(Duration::from_secs(60));
        store.put("k", roster(1), 1);
        let entry = store.peek("k").unwrap();
        let expiry = entry.expires_at().unwrap();
        assert!(!entry.is_expired_at(expiry - chrono::Duration::milliseconds(1)));
        assert!(entry.is_expired_at(expiry));
        assert!(entry.is_expired_at(expiry + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_get_evicts_expired_lazily() {
        let store = CacheStore::new(Duration::from_secs(60));
        store.put("k", roster(5), 5);
        store.backdate("k", Duration::from_secs(61));
        // peek still sees it; get treats it as missing and removes it
        assert!(store.peek("k").is_some());
        assert!(store.get("k").is_none());
        assert!(store.peek("k").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_peek_does_not_evict_expired() {
        let store = CacheStore::new(Duration::from_secs(1));
        store.put("k", roster(5), 5);
        store.backdate("k", Duration::from_secs(10));
        let entry = store.peek("k").unwrap();
        assert!(entry.is_expired());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_evict() {
        let store = CacheStore::new(DAY);
        store.put("k", roster(1), 1);
        assert!(store.evict("k"));
        assert!(!store.evict("k"), "second evict is a no-op");
        assert!(store.get("k").is_none());
    }

    #[test]
    fn test_evict_if_respects_predicate() {
        let store = CacheStore::new(DAY);
        store.put("k", roster(4), 4);
        assert!(!store.evict_if("k", |e| e.item_count == 0));
        assert!(store.peek("k").is_some());
        assert!(store.evict_if("k", |e| e.item_count == 4));
        assert!(store.peek("k").is_none());
        assert!(!store.evict_if("missing", |_| true));
    }

    #[test]
    fn test_list_keys_sorted() {
        let store = CacheStore::new(DAY);
        store.put("students:b", roster(1), 1);
        store.put("batches", roster(1), 1);
        store.put("students:a", roster(1), 1);
        assert_eq!(
            store.list_keys(),
            vec!["batches", "students:a", "students:b"]
        );
    }

    #[test]
    fn test_clear_all() {
        let store = CacheStore::new(DAY);
        store.put("a", roster(1), 1);
        store.put("b", roster(1), 1);
        assert_eq!(store.clear_all(), 2);
        assert!(store.is_empty());
        assert_eq!(store.clear_all(), 0);
    }

    #[test]
    fn test_purge_expired_keeps_fresh() {
        let store = CacheStore::new(Duration::from_secs(60));
        store.put("old", roster(1), 1);
        store.put("new", roster(1), 1);
        store.backdate("old", Duration::from_secs(120));
        assert_eq!(store.purge_expired(), vec!["old"]);
        assert_eq!(store.list_keys(), vec!["new"]);
    }

    #[test]
    fn test_summaries() {
        let store = CacheStore::new(Duration::from_secs(60));
        store.put("students:b", roster(0), 0);
        store.put("students:a", roster(2), 2);
        store.backdate("students:b", Duration::from_secs(90));
        let summaries = store.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].key, "students:a");
        assert_eq!(summaries[0].item_count, 2);
        assert!(!summaries[0].expired);
        assert_eq!(summaries[1].key, "students:b");
        assert!(summaries[1].expired);
    }

    #[test]
    fn test_concurrent_disjoint_writers() {
        let store = Arc::new(CacheStore::new(DAY));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store.put(&format!("k{t}-{i}"), roster(1), 1);
                        let _ = store.list_keys();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 800);
    }
}
