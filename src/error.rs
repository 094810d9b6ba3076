//! Error types for all cache-shield operations.

use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes surfaced by cache-shield.
///
/// Lock contention inside a bounded retry loop is normal control flow and is
/// NOT represented here; only exhausting every attempt produces
/// [`Error::LockContended`].
#[derive(Debug)]
pub enum Error {
    /// The key-value store could not be reached or rejected the operation.
    ///
    /// Propagated to the caller rather than silently falling through to the
    /// backing source, which could stampede it.
    BackendError(String),

    /// The backing-source loader itself failed.
    LoaderError(String),

    /// A value could not be serialized for cache storage.
    SerializationError(String),

    /// Stored bytes could not be deserialized into the requested type.
    DeserializationError(String),

    /// Stored bytes are not a cache-shield envelope (bad magic or truncated).
    InvalidCacheEntry(String),

    /// The stored envelope was written by an incompatible schema version.
    VersionMismatch { expected: u32, found: u32 },

    /// A mutex-guarded query exhausted its bounded lock retries.
    LockContended { key: String, attempts: u32 },

    /// The rebuild executor rejected a job (queue full or already stopped).
    ExecutorUnavailable(String),

    /// Invalid configuration supplied at construction time.
    ConfigError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "cache backend error: {}", msg),
            Error::LoaderError(msg) => write!(f, "source loader error: {}", msg),
            Error::SerializationError(msg) => write!(f, "serialization failed: {}", msg),
            Error::DeserializationError(msg) => write!(f, "deserialization failed: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => write!(
                f,
                "cache schema version mismatch: expected {}, found {}",
                expected, found
            ),
            Error::LockContended { key, attempts } => write!(
                f,
                "lock {} still contended after {} attempts",
                key, attempts
            ),
            Error::ExecutorUnavailable(msg) => write!(f, "rebuild executor unavailable: {}", msg),
            Error::ConfigError(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
