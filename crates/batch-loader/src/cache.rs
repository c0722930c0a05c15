//! TTL cache store
//!
//! Plain key -> entry map. Expired entries are never served; they are
//! purged lazily by the lookup that finds them.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{LoadError, Result};

/// A cached outcome: the resource, or a not-found marker when negative
/// caching is enabled
pub type Cached<V> = std::result::Result<V, LoadError>;

/// A single cache entry
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: Cached<V>,
    pub inserted_at: Instant,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Key -> value store with per-entry expiry
#[derive(Debug)]
pub struct CacheStore<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Look up a live entry, evicting it first if it has expired
    pub fn get(&mut self, key: &K) -> Option<Cached<V>> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                self.entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Insert or overwrite an entry
    pub fn set(&mut self, key: K, value: Cached<V>, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            return Err(LoadError::InvalidConfiguration(
                "cache ttl must be positive".to_string(),
            ));
        }
        let inserted_at = Instant::now();
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at,
                expires_at: inserted_at + ttl,
            },
        );
        Ok(())
    }

    /// Whether a live entry exists, without touching expired ones
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        self.entries.get(key).is_some_and(|e| !e.is_expired(now))
    }

    /// Remove an entry. Returns whether one was present.
    pub fn invalidate(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for CacheStore<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
