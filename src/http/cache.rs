//! Bounded GET response cache with per-entry expiry.

use log::debug;
use moka::sync::Cache;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::expiry::{Deadline, DeadlineExpiry};

/// Default lifetime of a cached GET response.
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_millis(30_000);

/// Default maximum number of cached responses.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Builds the cache key for a GET request.
///
/// Parameters are serialized in name order, so the order callers supply
/// them in does not matter.
pub fn cache_key(url: &str, params: &BTreeMap<String, String>) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish();
    format!("{}?{}", url, query)
}

#[derive(Debug, Clone)]
struct CachedResponse {
    data: Value,
    deadline: Instant,
}

impl Deadline for CachedResponse {
    fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Response cache owned by a single client.
///
/// Entries expire at their own deadline and are evicted lazily; once
/// `capacity` is reached the cache's admission policy decides what stays.
pub struct ResponseCache {
    entries: Cache<String, CachedResponse>,
    capacity: usize,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let entries = Cache::builder()
            .max_capacity(capacity as u64)
            .expire_after(DeadlineExpiry)
            .build();
        Self { entries, capacity }
    }

    /// Returns the payload if a live entry exists.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.data)
    }

    /// Stores `data` under `key` until `ttl` elapses, replacing any previous
    /// entry.
    pub fn insert(&self, key: String, data: Value, ttl: Duration) {
        let deadline = Instant::now() + ttl;
        self.entries.insert(key, CachedResponse { data, deadline });
    }

    /// Removes every entry whose key starts with `prefix`. Returns how many
    /// were removed.
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let keys: Vec<_> = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();
        for key in &keys {
            self.entries.invalidate(key.as_str());
        }
        debug!("[API] Invalidated {} cache entries under {}", keys.len(), prefix);
        keys.len()
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Number of stored entries once pending evictions have run.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
