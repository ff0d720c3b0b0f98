//! Time-limited side-channel for staging human-reviewable suggestions.
//!
//! Phase suggestions are staged here rather than written to the record
//! store; expiry is advisory, not safety-critical.

use crate::error::Result;
use rustc_hash::FxHashMap;
use std::time::{Duration, SystemTime};

/// Trait for suggestion caches.
pub trait SuggestionCache: Send + Sync {
    /// Store a value under `key` for at most `ttl`.
    fn set(&mut self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Fetch a value if present and not expired.
    fn get(&self, key: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: SystemTime,
}

impl CacheEntry {
    fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

/// In-memory suggestion cache with lazy expiry.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: FxHashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn cleanup_expired(&mut self, now: SystemTime) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before - self.entries.len()
    }
}

impl SuggestionCache for MemoryCache {
    fn set(&mut self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: SystemTime::now() + ttl,
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let now = SystemTime::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.value.clone()))
    }
}
