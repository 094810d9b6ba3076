//! Redis cache backend implementation.

use super::CacheBackend;
use crate::error::{Error, Result};
use deadpool_redis::{Pool, Runtime};
use redis::AsyncCommands;
use std::sync::OnceLock;
use std::time::Duration;

/// Default Redis connection pool size.
/// Formula: (CPU cores × 2) + 1
/// For 8-core systems: 16 connections is optimal
/// Override with REDIS_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: usize = 16;

/// Compare-and-delete executed server-side, so the read and the delete are
/// one atomic step. This is the release path of the distributed lock: a
/// client-side get-then-delete would let a lock that expired and was
/// re-acquired between the two calls be destroyed by its previous owner.
const DELETE_IF_EQUALS_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
end
return 0
"#;

fn delete_if_equals_script() -> &'static redis::Script {
    static SCRIPT: OnceLock<redis::Script> = OnceLock::new();
    SCRIPT.get_or_init(|| redis::Script::new(DELETE_IF_EQUALS_SCRIPT))
}

/// Configuration for the Redis backend.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub url: String, // e.g. "redis://127.0.0.1:6379"
    pub connection_timeout: Duration,
    pub pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            url: "redis://127.0.0.1:6379".to_string(),
            connection_timeout: Duration::from_secs(5),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

/// Redis backend with connection pooling and async operations.
///
/// # Example
///
/// ```no_run
/// # use cache_shield::backend::{CacheBackend, RedisBackend, RedisConfig};
/// # use cache_shield::Result;
/// # async fn example() -> Result<()> {
/// let backend = RedisBackend::new(RedisConfig::default())?;
/// backend.set("key", b"value".to_vec(), None).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Create a new Redis backend from configuration.
    ///
    /// # Errors
    /// Returns `Err` if the connection pool cannot be created.
    pub fn new(config: RedisConfig) -> Result<Self> {
        let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(config.connection_timeout);

        let mut cfg = deadpool_redis::Config::from_url(config.url.as_str());
        cfg.pool = Some(pool_config);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::ConfigError(format!("failed to create connection pool: {}", e)))?;

        info!(
            "✓ Redis backend initialized with {} (pool size: {})",
            config.url, config.pool_size
        );

        Ok(RedisBackend { pool })
    }

    /// Create from a connection URL directly.
    ///
    /// Pool size is determined by:
    /// 1. `REDIS_POOL_SIZE` environment variable (if set)
    /// 2. `DEFAULT_POOL_SIZE` constant (16)
    ///
    /// # Errors
    /// Returns `Err` if the connection pool cannot be created.
    pub fn from_url(url: impl Into<String>) -> Result<Self> {
        let pool_size = std::env::var("REDIS_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        Self::new(RedisConfig {
            url: url.into(),
            pool_size,
            ..Default::default()
        })
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::BackendError(format!("failed to get Redis connection: {}", e)))
    }
}

impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;

        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| Error::BackendError(format!("Redis GET failed for key {}: {}", key, e)))?;

        match &value {
            Some(_) => debug!("✓ Redis GET {} -> HIT", key),
            None => debug!("✗ Redis GET {} -> MISS", key),
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection().await?;

        match ttl {
            Some(ttl) => {
                // Redis rejects EX 0; a sub-second ttl rounds up to one.
                let secs = ttl.as_secs().max(1);
                let _: () = conn.set_ex(key, value, secs).await.map_err(|e| {
                    Error::BackendError(format!("Redis SETEX failed for key {}: {}", key, e))
                })?;
                debug!("✓ Redis SET {} (TTL: {}s)", key, secs);
            }
            None => {
                let _: () = conn.set(key, value).await.map_err(|e| {
                    Error::BackendError(format!("Redis SET failed for key {}: {}", key, e))
                })?;
                debug!("✓ Redis SET {}", key);
            }
        }
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection().await?;

        let reply: redis::Value = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                Error::BackendError(format!("Redis SET NX failed for key {}: {}", key, e))
            })?;

        // SET NX replies OK on success and Nil when the key already exists.
        let created = !matches!(reply, redis::Value::Nil);
        debug!("Redis SETNX {} -> {}", key, created);
        Ok(created)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;

        let _: i64 = conn.del(key).await.map_err(|e| {
            Error::BackendError(format!("Redis DEL failed for key {}: {}", key, e))
        })?;

        debug!("✓ Redis DEL {}", key);
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<u64> {
        let mut conn = self.connection().await?;

        let deleted: i64 = delete_if_equals_script()
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                Error::BackendError(format!(
                    "Redis compare-and-delete failed for key {}: {}",
                    key, e
                ))
            })?;

        Ok(deleted as u64)
    }

    async fn health_check(&self) -> Result<bool> {
        match self.pool.get().await {
            Ok(mut conn) => {
                let pong: std::result::Result<String, _> =
                    redis::cmd("PING").query_async(&mut conn).await;
                Ok(pong.is_ok())
            }
            Err(_) => Ok(false),
        }
    }
}
