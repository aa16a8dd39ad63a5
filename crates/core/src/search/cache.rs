//! Bounded TTL cache ("shoddy LRU").
//!
//! A small key/value store with capacity eviction by last access time and
//! per-entry expiry. Used to memoize expensive result-count queries; not a
//! general-purpose cache.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    last_used: Instant,
    expires_at: Instant,
}

/// Capacity-bounded cache with per-entry expiry.
///
/// All operations take a single mutex over the entry table, so an expiry
/// check plus the last-access update is one critical section.
pub struct ShoddyLru<K, V> {
    max_entries: usize,
    default_ttl: Duration,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> ShoddyLru<K, V> {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            max_entries,
            default_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a live entry, refreshing its last-access time. An expired
    /// entry is evicted and reported as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        let now = Instant::now();

        match entries.get_mut(key) {
            None => return None,
            Some(entry) => {
                if now <= entry.expires_at {
                    entry.last_used = now;
                    return Some(entry.value.clone());
                }
            }
        }

        entries.remove(key);
        None
    }

    /// Insert a value, evicting least-recently-accessed entries first if
    /// the table would exceed capacity. `ttl` falls back to the default.
    pub fn put(&self, key: K, value: V, ttl: Option<Duration>) {
        let mut entries = self.entries.lock().unwrap();

        if !entries.contains_key(&key) {
            let overflow = (entries.len() + 1).saturating_sub(self.max_entries);
            if overflow > 0 {
                let mut by_age: Vec<(K, Instant)> = entries
                    .iter()
                    .map(|(k, entry)| (k.clone(), entry.last_used))
                    .collect();
                by_age.sort_by_key(|(_, last_used)| *last_used);
                for (old_key, _) in by_age.into_iter().take(overflow) {
                    entries.remove(&old_key);
                }
            }
        }

        let now = Instant::now();
        entries.insert(
            key,
            CacheEntry {
                value,
                last_used: now,
                expires_at: now + ttl.unwrap_or(self.default_ttl),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
