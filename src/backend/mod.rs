//! Key-value store backends.
//!
//! A backend is a thin adapter over an external key-value service. It owns
//! no local state beyond its connection pool: the remote store is the single
//! source of truth for cached entries and lock state, across threads and
//! across processes.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

#[cfg(feature = "inmemory")]
mod inmemory;
#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use redis::{RedisBackend, RedisConfig};

/// Contract every key-value backend implements.
///
/// The two conditional operations carry the concurrency weight of the whole
/// crate: `set_if_absent` is the atomic create-only write locks are built
/// on, and `delete_if_equals` is the atomic compare-and-delete that makes
/// lock release safe after a lease expiry. A backend must execute both as a
/// single server-side step — a client-side read-then-write reintroduces
/// exactly the race these exist to prevent.
///
/// Methods return `impl Future + Send` so strategy code generic over the
/// backend can hand rebuild futures to a worker pool; implementations write
/// plain `async fn`s.
pub trait CacheBackend: Clone + Send + Sync + 'static {
    /// Fetch raw bytes. `Ok(None)` is a miss, not an error.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Unconditional write. `ttl: None` stores the key without expiry.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Atomic create-only write. Returns `true` iff the key did not exist
    /// and was written with the given ttl.
    fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Remove a key. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Atomically delete `key` iff its current value equals `expected`.
    /// Returns the number of keys deleted (0 or 1).
    fn delete_if_equals(
        &self,
        key: &str,
        expected: &[u8],
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Cheap liveness probe of the underlying service.
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send;
}
