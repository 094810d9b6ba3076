//! In-memory cache backend, used in tests and as a zero-infrastructure
//! default.

use super::CacheBackend;
use crate::error::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct StoredEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        StoredEntry {
            data,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Process-local backend over a concurrent map.
///
/// Clones share the same underlying table, so a clone handed to a worker
/// observes every write. TTLs are enforced lazily: an expired entry behaves
/// exactly like an absent one and is evicted on the read that notices it.
///
/// The conditional operations are atomic per key (the map's entry API holds
/// the shard lock across the check and the write), which is what lets the
/// distributed-lock tests run against this backend.
///
/// # Example
///
/// ```
/// # use cache_shield::backend::{CacheBackend, InMemoryBackend};
/// # async fn example() -> cache_shield::Result<()> {
/// let backend = InMemoryBackend::new();
/// backend.set("key", b"value".to_vec(), None).await?;
/// assert!(backend.get("key").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    entries: Arc<DashMap<String, StoredEntry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        InMemoryBackend {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Number of entries currently stored, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_if_expired(&self, key: &str) {
        self.entries.remove_if(key, |_, entry| entry.is_expired());
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let expired = match self.entries.get(key) {
            None => {
                debug!("✗ InMemory GET {} -> MISS", key);
                return Ok(None);
            }
            Some(entry) => {
                if !entry.is_expired() {
                    debug!("✓ InMemory GET {} -> HIT", key);
                    return Ok(Some(entry.data.clone()));
                }
                true
            }
        };
        // The shard guard is dropped here; evict outside of it.
        if expired {
            self.evict_if_expired(key);
            debug!("✗ InMemory GET {} -> expired", key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.entries
            .insert(key.to_string(), StoredEntry::new(value, ttl));
        debug!("✓ InMemory SET {} (ttl: {:?})", key, ttl);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let created = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_expired() => {
                occupied.insert(StoredEntry::new(value, Some(ttl)));
                true
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry::new(value, Some(ttl)));
                true
            }
        };
        debug!("InMemory SETNX {} -> {}", key, created);
        Ok(created)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        debug!("✓ InMemory DELETE {}", key);
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<u64> {
        let removed = self
            .entries
            .remove_if(key, |_, entry| !entry.is_expired() && entry.data == expected);
        Ok(if removed.is_some() { 1 } else { 0 })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
