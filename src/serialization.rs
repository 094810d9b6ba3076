//! Versioned binary codec for cached entries.
//!
//! Every real payload is framed as:
//!
//! ```text
//! [MAGIC: 4 bytes] [VERSION: 4 bytes LE] [POSTCARD PAYLOAD]
//! ```
//!
//! The frame serves two purposes: corrupted or foreign bytes are rejected
//! before deserialization, and a real payload can never be empty — which
//! reserves the empty byte sequence as the negative-cache sentinel (the
//! "confirmed not found" marker, distinct from a plain miss).
//!
//! Logical-expiry entries wrap the value in an envelope carrying its expiry
//! as epoch milliseconds; the store never sees a TTL for these keys, the
//! reader interprets the field.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Frame magic. Anything not starting with this is not ours.
const CACHE_MAGIC: &[u8; 4] = b"CSHD";

/// Bumped whenever the wire layout of cached payloads changes.
const SCHEMA_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    expire_at_ms: u64,
    value: T,
}

/// Serialize a value into the framed cache representation.
pub fn serialize_for_cache<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let payload = postcard::to_allocvec(value)
        .map_err(|e| Error::SerializationError(format!("postcard encoding failed: {}", e)))?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(CACHE_MAGIC);
    out.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Deserialize a framed cache representation back into a value.
///
/// # Errors
///
/// - `Error::InvalidCacheEntry`: truncated frame or wrong magic
/// - `Error::VersionMismatch`: written by an incompatible schema version
/// - `Error::DeserializationError`: corrupted payload
pub fn deserialize_from_cache<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let payload = validate_frame(bytes)?;
    postcard::from_bytes(payload)
        .map_err(|e| Error::DeserializationError(format!("postcard decoding failed: {}", e)))
}

/// Serialize a value wrapped in a logical-expiry envelope.
///
/// `expire_at` is `now + ttl`; the entry itself is stored without a TTL and
/// lives until the next rebuild overwrites it.
pub fn serialize_envelope<T: Serialize>(value: &T, ttl: Duration) -> Result<Vec<u8>> {
    let envelope = Envelope {
        expire_at_ms: epoch_millis().saturating_add(ttl.as_millis() as u64),
        value,
    };
    serialize_for_cache(&envelope)
}

/// Deserialize a logical-expiry envelope into `(value, expire_at_ms)`.
pub fn deserialize_envelope<T: DeserializeOwned>(bytes: &[u8]) -> Result<(T, u64)> {
    let envelope: Envelope<T> = deserialize_from_cache(bytes)?;
    Ok((envelope.value, envelope.expire_at_ms))
}

/// The negative-cache sentinel: a reserved empty payload meaning
/// "confirmed absent in the backing source".
pub fn null_marker() -> Vec<u8> {
    Vec::new()
}

/// Whether stored bytes are the negative-cache sentinel.
///
/// Real payloads always carry the frame header, so only the sentinel is
/// empty.
pub fn is_null_marker(bytes: &[u8]) -> bool {
    bytes.is_empty()
}

/// Milliseconds since the Unix epoch.
pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn validate_frame(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::InvalidCacheEntry(format!(
            "frame too short: {} bytes",
            bytes.len()
        )));
    }
    if &bytes[..4] != CACHE_MAGIC {
        return Err(Error::InvalidCacheEntry(
            "bad magic header".to_string(),
        ));
    }
    let found = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if found != SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: SCHEMA_VERSION,
            found,
        });
    }
    Ok(&bytes[HEADER_LEN..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Shop {
        id: u64,
        name: String,
        score: i32,
    }

    fn sample() -> Shop {
        Shop {
            id: 7,
            name: "coffee".to_string(),
            score: -3,
        }
    }

    #[test]
    fn test_round_trip() {
        let bytes = serialize_for_cache(&sample()).unwrap();
        let back: Shop = deserialize_from_cache(&bytes).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_real_payload_is_never_the_null_marker() {
        let bytes = serialize_for_cache(&sample()).unwrap();
        assert!(!is_null_marker(&bytes));

        // Even a unit value serializes to at least the frame header.
        let unit = serialize_for_cache(&()).unwrap();
        assert!(unit.len() >= 8);
        assert!(!is_null_marker(&unit));

        assert!(is_null_marker(&null_marker()));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = serialize_for_cache(&sample()).unwrap();
        bytes[0] = b'X';
        let err = deserialize_from_cache::<Shop>(&bytes).unwrap_err();
        assert!(matches!(err, Error::InvalidCacheEntry(_)));
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let err = deserialize_from_cache::<Shop>(b"CSH").unwrap_err();
        assert!(matches!(err, Error::InvalidCacheEntry(_)));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut bytes = serialize_for_cache(&sample()).unwrap();
        bytes[4..8].copy_from_slice(&99_u32.to_le_bytes());
        let err = deserialize_from_cache::<Shop>(&bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::VersionMismatch {
                expected: 1,
                found: 99
            }
        ));
    }

    #[test]
    fn test_corrupted_payload_rejected() {
        let mut bytes = serialize_for_cache(&sample()).unwrap();
        bytes.truncate(9);
        let err = deserialize_from_cache::<Shop>(&bytes).unwrap_err();
        assert!(matches!(err, Error::DeserializationError(_)));
    }

    #[test]
    fn test_envelope_round_trip() {
        let ttl = Duration::from_secs(20);
        let before = epoch_millis();
        let bytes = serialize_envelope(&sample(), ttl).unwrap();
        let (back, expire_at) = deserialize_envelope::<Shop>(&bytes).unwrap();

        assert_eq!(back, sample());
        // expire_at is in the future by approximately ttl
        assert!(expire_at >= before + 20_000);
        assert!(expire_at <= epoch_millis() + 20_000);
    }

    #[test]
    fn test_zero_ttl_envelope_is_immediately_expired() {
        let bytes = serialize_envelope(&sample(), Duration::ZERO).unwrap();
        let (_, expire_at) = deserialize_envelope::<Shop>(&bytes).unwrap();
        assert!(expire_at <= epoch_millis());
    }

    proptest! {
        #[test]
        fn prop_round_trip_preserves_value(id in any::<u64>(), name in ".*", score in any::<i32>()) {
            let shop = Shop { id, name, score };
            let bytes = serialize_for_cache(&shop).unwrap();
            let back: Shop = deserialize_from_cache(&bytes).unwrap();
            prop_assert_eq!(back, shop);
        }

        #[test]
        fn prop_envelope_round_trip(id in any::<u64>(), name in ".*", ttl_ms in 0_u64..86_400_000) {
            let shop = Shop { id, name, score: 0 };
            let bytes = serialize_envelope(&shop, Duration::from_millis(ttl_ms)).unwrap();
            let (back, _) = deserialize_envelope::<Shop>(&bytes).unwrap();
            prop_assert_eq!(back, shop);
        }
    }
}
