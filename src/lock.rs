//! Distributed mutual exclusion over the key-value store.
//!
//! The store's atomic conditional writes do all the work: acquisition is a
//! single create-only `SET`, release is a single server-side
//! compare-and-delete. No local state is authoritative, so the lock
//! serializes critical sections across independent processes, not just
//! threads.
//!
//! Every acquisition attempt mints a fresh owner token. The lease TTL bounds
//! the damage of a crashed holder (the lock frees itself without any
//! liveness detection), and the token comparison on release keeps a slow
//! holder from destroying a lock that expired and was re-acquired by someone
//! else in the meantime.

use crate::backend::CacheBackend;
use crate::error::Result;
use std::time::Duration;
use uuid::Uuid;

/// Proof of a successful acquisition. Required to release.
#[derive(Clone, Debug)]
pub struct LockHandle {
    key: String,
    token: String,
    lease: Duration,
}

impl LockHandle {
    /// The store key the lock is held under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// This acquisition's unique owner token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The lease the lock was acquired with.
    pub fn lease(&self) -> Duration {
        self.lease
    }
}

/// Lease-based lock backed by a [`CacheBackend`].
///
/// # Example
///
/// ```
/// # use cache_shield::{DistributedLock, backend::InMemoryBackend};
/// # use std::time::Duration;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> cache_shield::Result<()> {
/// let lock = DistributedLock::new(InMemoryBackend::new());
///
/// if let Some(handle) = lock.try_acquire("lock:report", Duration::from_secs(10)).await? {
///     // ... critical section ...
///     lock.release(&handle).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DistributedLock<B: CacheBackend> {
    backend: B,
}

impl<B: CacheBackend> DistributedLock<B> {
    pub fn new(backend: B) -> Self {
        DistributedLock { backend }
    }

    /// Attempt to take the lock. Non-blocking: `Ok(None)` means another
    /// owner currently holds it, and the caller decides whether to retry.
    ///
    /// Each call mints a fresh owner token, never reused across attempts —
    /// even by the same caller, so a handle from a previous lease can never
    /// pass the release comparison by accident.
    pub async fn try_acquire(
        &self,
        lock_key: &str,
        lease: Duration,
    ) -> Result<Option<LockHandle>> {
        let token = Uuid::new_v4().simple().to_string();

        let acquired = self
            .backend
            .set_if_absent(lock_key, token.clone().into_bytes(), lease)
            .await?;

        if acquired {
            debug!("✓ acquired lock {} (lease: {:?})", lock_key, lease);
            Ok(Some(LockHandle {
                key: lock_key.to_string(),
                token,
                lease,
            }))
        } else {
            debug!("✗ lock {} is held elsewhere", lock_key);
            Ok(None)
        }
    }

    /// Release a held lock.
    ///
    /// Returns `Ok(true)` if this call removed the lock, `Ok(false)` if the
    /// stored token no longer matched — the lease expired and the lock is
    /// free or owned by someone else. The latter is expected under lease
    /// expiry and is deliberately not an error.
    pub async fn release(&self, handle: &LockHandle) -> Result<bool> {
        let deleted = self
            .backend
            .delete_if_equals(&handle.key, handle.token.as_bytes())
            .await?;

        if deleted > 0 {
            debug!("✓ released lock {}", handle.key);
            Ok(true)
        } else {
            debug!(
                "lock {} no longer owned by this handle; release skipped",
                handle.key
            );
            Ok(false)
        }
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;

    fn lock() -> (DistributedLock<InMemoryBackend>, InMemoryBackend) {
        let backend = InMemoryBackend::new();
        (DistributedLock::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let (lock, _) = lock();
        let lease = Duration::from_secs(10);

        let handle = lock.try_acquire("lock:a", lease).await.unwrap().unwrap();
        assert_eq!(handle.key(), "lock:a");
        assert!(!handle.token().is_empty());

        // Held: a second attempt fails.
        assert!(lock.try_acquire("lock:a", lease).await.unwrap().is_none());

        // Released: acquirable again.
        assert!(lock.release(&handle).await.unwrap());
        assert!(lock.try_acquire("lock:a", lease).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_tokens_are_unique_per_attempt() {
        let (lock, _) = lock();
        let lease = Duration::from_secs(10);

        let first = lock.try_acquire("lock:a", lease).await.unwrap().unwrap();
        lock.release(&first).await.unwrap();
        let second = lock.try_acquire("lock:a", lease).await.unwrap().unwrap();

        assert_ne!(first.token(), second.token());
    }

    #[tokio::test]
    async fn test_independent_keys_do_not_contend() {
        let (lock, _) = lock();
        let lease = Duration::from_secs(10);

        assert!(lock.try_acquire("lock:a", lease).await.unwrap().is_some());
        assert!(lock.try_acquire("lock:b", lease).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_release_is_a_noop() {
        let (lock, _) = lock();

        // First owner's lease expires...
        let stale = lock
            .try_acquire("lock:a", Duration::from_millis(30))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        // ...and a second owner takes over.
        let current = lock
            .try_acquire("lock:a", Duration::from_secs(10))
            .await
            .unwrap()
            .unwrap();

        // The stale handle must not destroy the new owner's lock.
        assert!(!lock.release(&stale).await.unwrap());
        assert!(lock
            .try_acquire("lock:a", Duration::from_secs(10))
            .await
            .unwrap()
            .is_none());

        // The real owner can still release.
        assert!(lock.release(&current).await.unwrap());
    }

    #[tokio::test]
    async fn test_lease_expiry_frees_the_lock() {
        let (lock, _) = lock();

        let _abandoned = lock
            .try_acquire("lock:a", Duration::from_millis(30))
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(lock
            .try_acquire("lock:a", Duration::from_secs(10))
            .await
            .unwrap()
            .is_some());
    }
}
