//! The capability through which strategies reach the backing data source.

use crate::error::{Error, Result};
use crate::value::CacheValue;
use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One-method capability standing in for whatever lookup feeds the cache —
/// a SQL query, an RPC, another service.
///
/// `Ok(None)` is the *confirmed not found* signal that drives negative
/// caching; an `Err` means the lookup itself failed and nothing should be
/// cached.
pub trait SourceLoader<ID, T>: Send + Sync
where
    T: CacheValue,
{
    fn load(&self, id: &ID) -> impl Future<Output = Result<Option<T>>> + Send;
}

impl<ID, T, L> SourceLoader<ID, T> for Arc<L>
where
    ID: Sync,
    T: CacheValue,
    L: SourceLoader<ID, T>,
{
    fn load(&self, id: &ID) -> impl Future<Output = Result<Option<T>>> + Send {
        (**self).load(id)
    }
}

/// Adapts a plain async closure into a [`SourceLoader`].
///
/// The closure receives the id by value, which keeps borrows out of the
/// returned future:
///
/// ```ignore
/// let loader = loader_fn(|id: u64| async move { db.fetch_shop(id).await });
/// ```
pub struct FnLoader<F> {
    f: F,
}

/// Wrap an async closure as a loader.
pub fn loader_fn<F>(f: F) -> FnLoader<F> {
    FnLoader { f }
}

impl<ID, T, F, Fut> SourceLoader<ID, T> for FnLoader<F>
where
    ID: Clone + Send + Sync,
    T: CacheValue,
    F: Fn(ID) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<T>>> + Send,
{
    fn load(&self, id: &ID) -> impl Future<Output = Result<Option<T>>> + Send {
        (self.f)(id.clone())
    }
}

/// Table-backed loader for tests and demos.
///
/// Counts every `load` call (the property most cache tests assert on),
/// can simulate a slow backing source, and can be switched into a failing
/// state to exercise error paths. Clones share all state.
#[derive(Clone, Default)]
pub struct InMemoryLoader<ID: Eq + Hash, T> {
    entries: Arc<DashMap<ID, T>>,
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    latency: Option<Duration>,
}

impl<ID, T> InMemoryLoader<ID, T>
where
    ID: Eq + Hash + Clone + Send + Sync,
    T: CacheValue,
{
    pub fn new() -> Self {
        InMemoryLoader {
            entries: Arc::new(DashMap::new()),
            calls: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
            latency: None,
        }
    }

    /// Simulate a slow backing source; every `load` sleeps this long first.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, id: ID, value: T) {
        self.entries.insert(id, value);
    }

    pub fn remove(&self, id: &ID) {
        self.entries.remove(id);
    }

    /// How many times `load` has been called, across all clones.
    pub fn load_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// When `true`, every `load` returns `Error::LoaderError`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl<ID, T> SourceLoader<ID, T> for InMemoryLoader<ID, T>
where
    ID: Eq + Hash + Clone + Send + Sync,
    T: CacheValue,
{
    async fn load(&self, id: &ID) -> Result<Option<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::LoaderError("backing source unavailable".to_string()));
        }

        Ok(self.entries.get(id).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_hit_and_miss() {
        let loader: InMemoryLoader<u64, String> = InMemoryLoader::new();
        loader.insert(1, "one".to_string());

        assert_eq!(loader.load(&1).await.unwrap(), Some("one".to_string()));
        assert_eq!(loader.load(&2).await.unwrap(), None);
        assert_eq!(loader.load_count(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_call_count() {
        let loader: InMemoryLoader<u64, String> = InMemoryLoader::new();
        let clone = loader.clone();
        clone.load(&1).await.unwrap();
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_state() {
        let loader: InMemoryLoader<u64, String> = InMemoryLoader::new();
        loader.insert(1, "one".to_string());
        loader.set_failing(true);

        let err = loader.load(&1).await.unwrap_err();
        assert!(matches!(err, Error::LoaderError(_)));

        loader.set_failing(false);
        assert!(loader.load(&1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_loader_fn_adapter() {
        let loader = loader_fn(|id: u64| async move {
            if id == 7 {
                Ok(Some(format!("shop-{}", id)))
            } else {
                Ok(None)
            }
        });

        assert_eq!(loader.load(&7).await.unwrap(), Some("shop-7".to_string()));
        assert_eq!(loader.load(&8).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_arc_loader_delegates() {
        let loader: Arc<InMemoryLoader<u64, String>> = Arc::new(InMemoryLoader::new());
        loader.insert(1, "one".to_string());

        // Calling through the Arc impl still hits the same loader.
        let result = SourceLoader::load(&loader, &1).await.unwrap();
        assert_eq!(result, Some("one".to_string()));
        assert_eq!(loader.load_count(), 1);
    }
}
