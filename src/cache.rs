use crate::metrics;
use dashmap::DashMap;
use log::debug;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

/// General-purpose in-process cache keyed by string.
///
/// Backs the pricing cache and the route caches with a unified interface.
///
/// ## Features
///
/// - **Lazy TTL**: expired entries are dropped on first read after expiry
/// - **Bounded size**: manual eviction of first-N entries past `max_size`
/// - **Thread-Safe**: lock-free concurrent access via `DashMap`
#[derive(Debug)]
pub struct Cache<V: Clone> {
    name: &'static str,
    entries: DashMap<String, CacheEntry<V>>,
    max_size: usize,
}

impl<V: Clone> Cache<V> {
    pub fn new(name: &'static str, max_size: usize) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            max_size,
        }
    }

    /// Inserts `value` under `key`. A `ttl` of `None` never expires.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let entry = CacheEntry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.insert(key.into(), entry);
        self.maybe_evict();
        metrics::set_cache_size(self.name, self.entries.len() as f64);
    }

    /// Returns the cached value if present and not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(Instant::now()) {
                metrics::increment_cache_hit(self.name);
                return Some(entry.value.clone());
            }
        } else {
            metrics::increment_cache_miss(self.name);
            return None;
        }
        // The read guard must be released before removing from the same shard.
        self.entries.remove(key);
        metrics::increment_cache_miss(self.name);
        None
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Drops every expired entry eagerly. Callers that only read via `get`
    /// never need this; background sweeps use it to keep size metrics honest.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        metrics::set_cache_size(self.name, self.entries.len() as f64);
    }

    // Manual eviction when the cache exceeds max size
    fn maybe_evict(&self) {
        if self.entries.len() > self.max_size {
            // Simple eviction: remove the first N entries by iteration order
            let to_remove = self.entries.len() - self.max_size;
            let victims: Vec<String> = self
                .entries
                .iter()
                .take(to_remove)
                .map(|entry| entry.key().clone())
                .collect();
            for key in &victims {
                self.entries.remove(key);
            }
            if !victims.is_empty() {
                debug!(
                    "Evicted {} entries from {} cache (size: {})",
                    victims.len(),
                    self.name,
                    self.entries.len()
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
        metrics::set_cache_size(self.name, 0.0);
    }
}
