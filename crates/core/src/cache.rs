//! Bounded TTL response cache.
//!
//! Entries expire lazily: a lookup that finds a stale entry removes it and
//! reports a miss. When an insert would exceed `max_entries`, stale entries
//! are purged first and then the least recently used entry is evicted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use crate::clock::{Clock, SystemClock};

/// Default TTL used by [`ResponseCache::set_default`]
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: u64,
    expires_at: u64,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Live (unexpired) entries
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses) * 100`, rounded; 0 before the first lookup
    pub hit_rate: u32,
    pub max_entries: usize,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Capacity-bounded key/value cache with per-entry TTL
pub struct ResponseCache<V> {
    entries: Mutex<LruCache<String, Entry<V>>>,
    max_entries: usize,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> ResponseCache<V> {
    /// Create a cache holding at most `max_entries` (minimum 1)
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self::with_clock(max_entries, default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(max_entries: usize, default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            max_entries: max_entries.max(1),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            clock,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a live entry, marking it most recently used
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock();

        let expired = match entries.peek(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            entries.pop(key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or replace `key`, expiring after `ttl`
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = self.clock.now_millis();
        let entry = Entry {
            value,
            inserted_at: now,
            expires_at: now.saturating_add(ttl.as_millis() as u64),
        };

        let mut entries = self.entries.lock();
        if !entries.contains(&key) && entries.len() >= self.max_entries {
            purge_expired(&mut entries, now);
            while entries.len() >= self.max_entries {
                match entries.pop_lru() {
                    Some((victim, evicted)) => tracing::debug!(
                        key = %victim,
                        age_ms = now.saturating_sub(evicted.inserted_at),
                        "evicted cache entry"
                    ),
                    None => break,
                }
            }
        }
        entries.put(key, entry);
    }

    /// Insert with the cache's default TTL
    pub fn set_default(&self, key: impl Into<String>, value: V) {
        self.set(key, value, self.default_ttl);
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    /// Remove every entry whose key starts with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.lock();
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        doomed.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Current statistics; expired entries are purged before counting
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now_millis();
        let size = {
            let mut entries = self.entries.lock();
            purge_expired(&mut entries, now);
            entries.len()
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);

        CacheStats {
            size,
            hits,
            misses,
            hit_rate: hit_rate(hits, misses),
            max_entries: self.max_entries,
        }
    }
}

fn purge_expired<V>(entries: &mut LruCache<String, Entry<V>>, now: u64) -> usize {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.is_expired(now))
        .map(|(key, _)| key.clone())
        .collect();
    for key in &expired {
        entries.pop(key);
    }
    expired.len()
}

fn hit_rate(hits: u64, misses: u64) -> u32 {
    let total = hits + misses;
    if total == 0 {
        return 0;
    }
    ((hits as f64 / total as f64) * 100.0).round() as u32
}
