//! The strategy engine - main entry point for protected cache reads.

use crate::backend::CacheBackend;
use crate::error::{Error, Result};
use crate::executor::{ExecutorConfig, RebuildExecutor, RebuildJob};
use crate::key::CacheKeyBuilder;
use crate::loader::SourceLoader;
use crate::lock::{DistributedLock, LockHandle};
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::serialization;
use crate::strategy::ReadStrategy;
use crate::value::CacheValue;
use rand::Rng;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tunables for the strategy engine.
///
/// Defaults: positive entries live 30 minutes, negative markers 2 minutes
/// (long enough to absorb a burst of penetrating lookups, short enough to
/// bound how long a genuinely-missing key pollutes the cache), rebuild
/// locks lease 10 seconds (outlasts a typical loader call, self-heals a
/// crashed rebuilder quickly).
#[derive(Clone, Debug)]
pub struct ShieldConfig {
    /// Positive-entry TTL used when the builder is not given one.
    pub default_ttl: Duration,
    /// TTL of the negative-cache marker.
    pub null_ttl: Duration,
    /// Lease on rebuild locks.
    pub lock_lease: Duration,
    /// Fixed wait between mutex-guarded lock attempts.
    pub lock_retry_backoff: Duration,
    /// Upper bound of the random extra wait added to each backoff, spreading
    /// out retry storms.
    pub lock_retry_jitter: Duration,
    /// Total lock attempts before a mutex-guarded query gives up.
    pub lock_max_attempts: u32,
    /// Namespace prepended to data prefixes to form lock keys.
    pub lock_prefix: String,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        ShieldConfig {
            default_ttl: Duration::from_secs(30 * 60),
            null_ttl: Duration::from_secs(2 * 60),
            lock_lease: Duration::from_secs(10),
            lock_retry_backoff: Duration::from_millis(50),
            lock_retry_jitter: Duration::from_millis(25),
            lock_max_attempts: 10,
            lock_prefix: "lock:".to_string(),
        }
    }
}

/// What a probe of the store found under a key.
enum Probe<T> {
    /// A decodable real payload.
    Hit(T),
    /// The negative-cache marker: confirmed absent in the backing source.
    Negative,
    /// Nothing usable - key absent, or entry undecodable and discarded.
    Miss,
}

/// Read-through cache protection over a [`CacheBackend`].
///
/// Dispatches queries through one of three strategies (see
/// [`ReadStrategy`]), coordinating rebuilds through a [`DistributedLock`]
/// and a [`RebuildExecutor`]. The store is the single source of truth:
/// every value round-trips through serialization and nothing is cached in
/// process.
///
/// # Example
///
/// ```ignore
/// let shield = CacheShield::new(RedisBackend::from_url("redis://cache:6379")?);
///
/// let shop = shield
///     .query("shop:", &id, &loader, Duration::from_secs(1800), ReadStrategy::PassThrough)
///     .await?;
/// ```
///
/// Construction spawns the rebuild pool, so it must happen inside a Tokio
/// runtime. Call [`shutdown`](CacheShield::shutdown) at teardown to drain
/// in-flight rebuilds.
pub struct CacheShield<B: CacheBackend> {
    backend: B,
    lock: DistributedLock<B>,
    executor: RebuildExecutor,
    metrics: Arc<dyn CacheMetrics>,
    pub(crate) config: ShieldConfig,
}

impl<B: CacheBackend> CacheShield<B> {
    /// Create a shield over the given backend with default configuration.
    pub fn new(backend: B) -> Self {
        CacheShield {
            lock: DistributedLock::new(backend.clone()),
            backend,
            executor: RebuildExecutor::new(ExecutorConfig::default()),
            metrics: Arc::new(NoOpMetrics),
            config: ShieldConfig::default(),
        }
    }

    /// Replace the default configuration.
    pub fn with_config(mut self, config: ShieldConfig) -> Self {
        self.config = config;
        self
    }

    /// Set a custom metrics handler.
    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the default rebuild pool.
    pub fn with_executor(mut self, executor: RebuildExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Create a builder for configuring a single query fluently.
    pub fn builder(&self) -> crate::builder::QueryBuilder<'_, B> {
        crate::builder::QueryBuilder::new(self)
    }

    /// Get backend reference (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Protected read-through query.
    ///
    /// `Ok(None)` means the entity is confirmed absent in the backing
    /// source - for [`ReadStrategy::LogicalExpiry`], that it has no
    /// pre-warmed entry.
    ///
    /// # Errors
    ///
    /// - `Error::BackendError`: the store is unreachable; this propagates
    ///   instead of falling through to the loader, which could stampede
    ///   the backing source
    /// - `Error::LoaderError`: the backing-source call failed (synchronous
    ///   strategies only; rebuild jobs absorb loader failures)
    /// - `Error::LockContended`: a mutex-guarded query exhausted its
    ///   bounded lock retries
    /// - `Error::SerializationError`: the loaded value could not be encoded
    pub async fn query<ID, T, L>(
        &self,
        prefix: &str,
        id: &ID,
        loader: &L,
        ttl: Duration,
        strategy: ReadStrategy,
    ) -> Result<Option<T>>
    where
        ID: Display + Clone + Send + Sync + 'static,
        T: CacheValue + 'static,
        L: SourceLoader<ID, T> + Clone + 'static,
    {
        let started = Instant::now();
        let key = CacheKeyBuilder::data_key(prefix, id);
        let lock_key = CacheKeyBuilder::lock_key(&self.config.lock_prefix, prefix, id);

        debug!("» {} query for key {}", strategy, key);

        let result = match strategy {
            ReadStrategy::PassThrough => {
                self.strategy_pass_through(&key, id, loader, ttl, started).await
            }
            ReadStrategy::MutexGuarded => {
                self.strategy_mutex_guarded(&key, &lock_key, id, loader, ttl, started)
                    .await
            }
            ReadStrategy::LogicalExpiry => {
                self.strategy_logical_expiry(&key, &lock_key, id, loader, ttl, started)
                    .await
            }
        };

        if let Err(e) = &result {
            self.metrics.record_error(&key, &e.to_string());
        }
        result
    }

    /// Write a positive entry directly. `ttl: None` stores it without
    /// expiry.
    pub async fn set<ID, T>(
        &self,
        prefix: &str,
        id: &ID,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()>
    where
        ID: Display,
        T: CacheValue,
    {
        let key = CacheKeyBuilder::data_key(prefix, id);
        let bytes = value.encode_for_cache()?;
        self.backend.set(&key, bytes, ttl).await
    }

    /// Pre-warm an entry for [`ReadStrategy::LogicalExpiry`]: the value is
    /// wrapped in an envelope expiring `ttl` from now, stored without a
    /// store-level TTL.
    pub async fn set_with_logical_expiry<ID, T>(
        &self,
        prefix: &str,
        id: &ID,
        value: &T,
        ttl: Duration,
    ) -> Result<()>
    where
        ID: Display,
        T: CacheValue,
    {
        let key = CacheKeyBuilder::data_key(prefix, id);
        let bytes = serialization::serialize_envelope(value, ttl)?;
        self.backend.set(&key, bytes, None).await
    }

    /// Evict an entry, e.g. after updating the backing source.
    pub async fn invalidate<ID: Display>(&self, prefix: &str, id: &ID) -> Result<()> {
        let key = CacheKeyBuilder::data_key(prefix, id);
        self.backend.delete(&key).await
    }

    /// Drain in-flight rebuilds and stop the rebuild pool.
    pub async fn shutdown(self) {
        self.executor.shutdown().await;
    }

    /// Penetration protection: misses fall through to the loader and a
    /// confirmed "not found" is cached as a short-lived negative marker.
    async fn strategy_pass_through<ID, T, L>(
        &self,
        key: &str,
        id: &ID,
        loader: &L,
        ttl: Duration,
        started: Instant,
    ) -> Result<Option<T>>
    where
        ID: Display + Send + Sync,
        T: CacheValue,
        L: SourceLoader<ID, T>,
    {
        match self.probe::<T>(key).await? {
            Probe::Hit(value) => {
                self.metrics.record_hit(key, started.elapsed());
                Ok(Some(value))
            }
            Probe::Negative => {
                debug!("✓ negative hit for {}; loader spared", key);
                self.metrics.record_negative_hit(key);
                Ok(None)
            }
            Probe::Miss => {
                let result = self.load_and_store(key, id, loader, ttl).await;
                if result.is_ok() {
                    self.metrics.record_miss(key, started.elapsed());
                }
                result
            }
        }
    }

    /// Breakdown protection: the rebuild of a cold key runs under the
    /// distributed lock, with bounded sleep-and-retry for everyone else.
    async fn strategy_mutex_guarded<ID, T, L>(
        &self,
        key: &str,
        lock_key: &str,
        id: &ID,
        loader: &L,
        ttl: Duration,
        started: Instant,
    ) -> Result<Option<T>>
    where
        ID: Display + Send + Sync,
        T: CacheValue,
        L: SourceLoader<ID, T>,
    {
        let attempts = self.config.lock_max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.probe::<T>(key).await? {
                Probe::Hit(value) => {
                    self.metrics.record_hit(key, started.elapsed());
                    return Ok(Some(value));
                }
                Probe::Negative => {
                    self.metrics.record_negative_hit(key);
                    return Ok(None);
                }
                Probe::Miss => {}
            }

            match self.lock.try_acquire(lock_key, self.config.lock_lease).await? {
                Some(handle) => {
                    // Re-probe under the lock: the previous holder may have
                    // rebuilt the entry between our probe and this
                    // acquisition, and loading again would break the
                    // single-flight guarantee.
                    let outcome = match self.probe::<T>(key).await {
                        Ok(Probe::Hit(value)) => {
                            self.metrics.record_hit(key, started.elapsed());
                            Ok(Some(value))
                        }
                        Ok(Probe::Negative) => {
                            self.metrics.record_negative_hit(key);
                            Ok(None)
                        }
                        Ok(Probe::Miss) => {
                            let result = self.load_and_store(key, id, loader, ttl).await;
                            if result.is_ok() {
                                self.metrics.record_miss(key, started.elapsed());
                            }
                            result
                        }
                        Err(e) => Err(e),
                    };

                    // Release on every exit path, loader failure included.
                    if let Err(e) = self.lock.release(&handle).await {
                        warn!("failed to release rebuild lock {}: {}", lock_key, e);
                    }
                    return outcome;
                }
                None => {
                    self.metrics.record_lock_contention(lock_key, attempt);
                    debug!(
                        "lock {} busy (attempt {}/{}); backing off",
                        lock_key, attempt, attempts
                    );
                    tokio::time::sleep(self.backoff_with_jitter()).await;
                }
            }
        }

        Err(Error::LockContended {
            key: lock_key.to_string(),
            attempts,
        })
    }

    /// Stale-while-revalidate: expired entries are served as-is while one
    /// background job rebuilds them. Assumes pre-warmed entries; performs
    /// no synchronous loads.
    async fn strategy_logical_expiry<ID, T, L>(
        &self,
        key: &str,
        lock_key: &str,
        id: &ID,
        loader: &L,
        ttl: Duration,
        started: Instant,
    ) -> Result<Option<T>>
    where
        ID: Display + Clone + Send + Sync + 'static,
        T: CacheValue + 'static,
        L: SourceLoader<ID, T> + Clone + 'static,
    {
        let Some(bytes) = self.backend.get(key).await? else {
            debug!("✗ no pre-warmed entry at {}", key);
            self.metrics.record_miss(key, started.elapsed());
            return Ok(None);
        };

        let (value, expire_at_ms) = match serialization::deserialize_envelope::<T>(&bytes) {
            Ok(decoded) => decoded,
            Err(e) => {
                // Envelope entries have no store TTL, so corrupt bytes would
                // otherwise sit there forever; drop them and let the next
                // warm-up repopulate.
                warn!("discarding undecodable envelope at {}: {}", key, e);
                if let Err(e) = self.backend.delete(key).await {
                    warn!("failed to drop corrupt envelope {}: {}", key, e);
                }
                self.metrics.record_miss(key, started.elapsed());
                return Ok(None);
            }
        };

        if expire_at_ms > serialization::epoch_millis() {
            self.metrics.record_hit(key, started.elapsed());
            return Ok(Some(value));
        }

        // Expired. Whoever wins the lock schedules the rebuild; every
        // caller returns the stale value without waiting.
        if let Some(handle) = self.lock.try_acquire(lock_key, self.config.lock_lease).await? {
            let fallback = handle.clone();
            let job =
                self.rebuild_job::<ID, T, L>(key.to_string(), id.clone(), loader.clone(), ttl, handle);

            if let Err(e) = self.executor.submit(job) {
                warn!("could not schedule rebuild for {}: {}", key, e);
                if let Err(e) = self.lock.release(&fallback).await {
                    warn!("failed to release rebuild lock {}: {}", lock_key, e);
                }
            }
        } else {
            debug!("rebuild for {} already in flight; serving stale", key);
        }

        self.metrics.record_hit(key, started.elapsed());
        Ok(Some(value))
    }

    /// Build the fire-and-forget rebuild future. Failures are logged, never
    /// propagated; the lock is released unconditionally at the end.
    fn rebuild_job<ID, T, L>(
        &self,
        key: String,
        id: ID,
        loader: L,
        ttl: Duration,
        handle: LockHandle,
    ) -> RebuildJob
    where
        ID: Display + Send + Sync + 'static,
        T: CacheValue + 'static,
        L: SourceLoader<ID, T> + 'static,
    {
        let backend = self.backend.clone();
        let lock = self.lock.clone();
        let metrics = Arc::clone(&self.metrics);

        Box::pin(async move {
            let outcome: Result<()> = async {
                let loaded: Option<T> = loader.load(&id).await?;
                match loaded {
                    Some(fresh) => {
                        let bytes = serialization::serialize_envelope(&fresh, ttl)?;
                        backend.set(&key, bytes, None).await
                    }
                    // Gone from the backing source: drop the entry so the
                    // next read is an honest miss.
                    None => backend.delete(&key).await,
                }
            }
            .await;

            match outcome {
                Ok(()) => {
                    debug!("✓ rebuilt logical-expiry entry {}", key);
                    metrics.record_rebuild(&key);
                }
                Err(e) => {
                    // The stale envelope stays in place; the next expiry
                    // check retries.
                    warn!("rebuild for {} failed: {}", key, e);
                }
            }

            if let Err(e) = lock.release(&handle).await {
                warn!("failed to release rebuild lock {}: {}", handle.key(), e);
            }
        })
    }

    /// Classify what the store currently holds under `key`. Undecodable
    /// entries are logged and demoted to misses so the next rebuild heals
    /// them.
    async fn probe<T: CacheValue>(&self, key: &str) -> Result<Probe<T>> {
        match self.backend.get(key).await? {
            None => Ok(Probe::Miss),
            Some(bytes) if serialization::is_null_marker(&bytes) => Ok(Probe::Negative),
            Some(bytes) => match T::decode_from_cache(&bytes) {
                Ok(value) => Ok(Probe::Hit(value)),
                Err(e) => {
                    warn!("discarding undecodable entry at {}: {}", key, e);
                    Ok(Probe::Miss)
                }
            },
        }
    }

    /// Fetch from the backing source and write back: real values get the
    /// caller's TTL, confirmed absences get the short negative marker.
    /// Write-back is best-effort - a loaded value is returned even if the
    /// store rejects the write.
    async fn load_and_store<ID, T, L>(
        &self,
        key: &str,
        id: &ID,
        loader: &L,
        ttl: Duration,
    ) -> Result<Option<T>>
    where
        ID: Display + Send + Sync,
        T: CacheValue,
        L: SourceLoader<ID, T>,
    {
        match loader.load(id).await? {
            Some(value) => {
                let bytes = value.encode_for_cache()?;
                if let Err(e) = self.backend.set(key, bytes, Some(ttl)).await {
                    warn!("write-back for {} failed: {}", key, e);
                }
                Ok(Some(value))
            }
            None => {
                if let Err(e) = self
                    .backend
                    .set(key, serialization::null_marker(), Some(self.config.null_ttl))
                    .await
                {
                    warn!("negative-marker write for {} failed: {}", key, e);
                }
                debug!(
                    "✗ {} absent in backing source; cached negative for {:?}",
                    key, self.config.null_ttl
                );
                Ok(None)
            }
        }
    }

    fn backoff_with_jitter(&self) -> Duration {
        let jitter_ms = self.config.lock_retry_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.config.lock_retry_backoff + Duration::from_millis(jitter)
    }
}
