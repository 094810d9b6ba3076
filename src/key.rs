//! Cache key construction.

use std::fmt::Display;

/// Builds the store keys used by the strategy engine.
///
/// Data keys are the plain concatenation `{prefix}{id}` — the caller-chosen
/// prefix must be unique per logical entity type and carries its own
/// separator (e.g. `"shop:"`). Lock keys live in a separate namespace so a
/// rebuild lock can never collide with the entry it protects.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Key under which an entry is cached. Same `(prefix, id)` always
    /// produces the same key.
    pub fn data_key<ID: Display>(prefix: &str, id: &ID) -> String {
        format!("{}{}", prefix, id)
    }

    /// Key under which the rebuild lock for `(prefix, id)` is held.
    pub fn lock_key<ID: Display>(lock_prefix: &str, prefix: &str, id: &ID) -> String {
        format!("{}{}{}", lock_prefix, prefix, id)
    }
}
