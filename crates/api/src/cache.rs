//! A TTL-only key-value cache.
//!
//! Used for event-id deduplication and for avoiding cheap recomputation
//! (cached head heights, listener cursors). Entries expire; nothing is
//! evicted by size; the key space is small and bounded by configuration.

use attestor_types::value::Value;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// The process-wide shared cache instance type: one keyed store over the
/// canonical value grammar, holding "seen" sentinels, cursors, and cached
/// heights side by side.
pub type SharedCache = TtlCache<Value>;

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

/// A keyed cache whose entries expire after a per-insert TTL.
///
/// Reads and writes are atomic per key; expired entries are dropped on read
/// or by an explicit [`TtlCache::purge_expired`] sweep.
pub struct TtlCache<T> {
    entries: DashMap<String, Entry<T>>,
}

impl<T> Default for TtlCache<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T: Clone> TtlCache<T> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a value with its own TTL.
    pub fn insert(&self, key: impl Into<String>, value: T, ttl: Duration) {
        self.entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Returns a live value, dropping the entry if it has expired.
    pub fn get(&self, key: &str) -> Option<T> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, e| e.expires_at <= Instant::now());
        }
        None
    }

    /// True when a live entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Removes an entry outright.
    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, e| e.expires_at > now);
    }

    /// Number of entries currently stored, live or not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
