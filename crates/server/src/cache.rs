//! Typed access to the shared response cache

use std::time::Duration;

use rounds_core::ResponseCache;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;

use crate::middleware::metrics::record_cache_lookup;

/// Cached response bodies, stored as JSON
pub type JsonCache = ResponseCache<JsonValue>;

/// Look up `key` and decode it; an entry that fails to decode is dropped and
/// reported as a miss
pub fn get_json<T: DeserializeOwned>(cache: &JsonCache, key: &str) -> Option<T> {
    let decoded = cache.get(key).and_then(|value| {
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(key, error = %e, "Dropping undecodable cache entry");
                cache.invalidate(key);
                None
            }
        }
    });
    record_cache_lookup(decoded.is_some());
    decoded
}

/// Store `value` under `key`; `None` uses the cache's default TTL
pub fn set_json<T: Serialize>(cache: &JsonCache, key: &str, value: &T, ttl: Option<Duration>) {
    match serde_json::to_value(value) {
        Ok(value) => match ttl {
            Some(ttl) => cache.set(key, value, ttl),
            None => cache.set_default(key, value),
        },
        Err(e) => tracing::warn!(key, error = %e, "Skipping unserializable cache entry"),
    }
}
