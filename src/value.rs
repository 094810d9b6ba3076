//! Trait bound for values that can live in the cache.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Anything that can round-trip through the cache.
///
/// Blanket-implemented for every `Clone + Serialize + Deserialize` type, so
/// domain structs need no manual impl:
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use cache_shield::CacheValue;
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Shop {
///     id: u64,
///     name: String,
/// }
///
/// fn assert_cacheable<T: CacheValue>() {}
/// assert_cacheable::<Shop>();
/// ```
///
/// The encode/decode methods are not meant to be overridden; every entry in
/// the store goes through the same versioned frame (see
/// `crate::serialization`), which is what keeps the negative-cache sentinel
/// unambiguous.
pub trait CacheValue: Send + Sync + Clone + Serialize + for<'de> Deserialize<'de> {
    /// Serialize for cache storage using the crate's framed codec.
    fn encode_for_cache(&self) -> Result<Vec<u8>> {
        crate::serialization::serialize_for_cache(self)
    }

    /// Deserialize from cache storage, validating the frame first.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidCacheEntry`: bad magic or truncated frame
    /// - `Error::VersionMismatch`: schema version changed
    /// - `Error::DeserializationError`: corrupted payload
    fn decode_from_cache(bytes: &[u8]) -> Result<Self> {
        crate::serialization::deserialize_from_cache(bytes)
    }
}

impl<T> CacheValue for T where T: Send + Sync + Clone + Serialize + for<'de> Deserialize<'de> {}
