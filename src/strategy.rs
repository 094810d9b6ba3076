//! Read strategies and the failure mode each one addresses.

use std::fmt;

/// How a query treats misses, expiry, and concurrent rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadStrategy {
    /// Penetration protection. Misses fall through to the loader; a
    /// confirmed "not found" is cached as a short-lived negative marker so
    /// repeated lookups for nonexistent keys stop reaching the backing
    /// source.
    #[default]
    PassThrough,

    /// Breakdown protection. Like [`PassThrough`](ReadStrategy::PassThrough),
    /// but the rebuild of a cold key runs under a distributed lock with
    /// bounded retry, so a thundering herd produces exactly one loader call.
    /// Callers block until the fresh value is available.
    MutexGuarded,

    /// Stale-while-revalidate. Entries carry a client-interpreted expiry;
    /// reads never block — an expired entry is returned as-is while one
    /// background job rebuilds it. Assumes pre-warmed entries and performs
    /// no synchronous loads.
    LogicalExpiry,
}

impl fmt::Display for ReadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadStrategy::PassThrough => write!(f, "pass-through"),
            ReadStrategy::MutexGuarded => write!(f, "mutex-guarded"),
            ReadStrategy::LogicalExpiry => write!(f, "logical-expiry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_pass_through() {
        assert_eq!(ReadStrategy::default(), ReadStrategy::PassThrough);
    }

    #[test]
    fn test_display() {
        assert_eq!(ReadStrategy::PassThrough.to_string(), "pass-through");
        assert_eq!(ReadStrategy::MutexGuarded.to_string(), "mutex-guarded");
        assert_eq!(ReadStrategy::LogicalExpiry.to_string(), "logical-expiry");
    }
}
