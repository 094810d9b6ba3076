//! # cache-shield
//!
//! Cache-aside protection for Rust services backed by an external key-value
//! store.
//!
//! ## Features
//!
//! - **Penetration protection:** confirmed "not found" results are cached as
//!   short-lived negative markers, so lookups for nonexistent keys stop
//!   reaching the backing source
//! - **Breakdown protection:** cold-key rebuilds run under a distributed
//!   lock with bounded, jittered retry — a thundering herd produces exactly
//!   one loader call
//! - **Stale-while-revalidate:** logically-expired entries are served
//!   immediately while a bounded worker pool rebuilds them in the background
//! - **Distributed lock:** lease-based mutual exclusion with owner-token
//!   protected release, usable on its own beyond caching
//! - **Backend Agnostic:** in-memory and Redis backends included, custom
//!   backends via one trait
//! - **Type Safe:** fully generic over the cached value and id types
//!
//! ## Quick Start
//!
//! ```ignore
//! use cache_shield::{
//!     backend::RedisBackend, loader_fn, CacheShield, ReadStrategy,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Shop {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> cache_shield::Result<()> {
//!     let shield = CacheShield::new(RedisBackend::from_url("redis://127.0.0.1:6379")?);
//!
//!     let loader = loader_fn(|id: u64| async move {
//!         // fetch from the real data source
//!         Ok(Some(Shop { id, name: "coffee".into() }))
//!     });
//!
//!     let shop = shield
//!         .query("shop:", &7, &loader, Duration::from_secs(1800), ReadStrategy::MutexGuarded)
//!         .await?;
//!
//!     shield.shutdown().await;
//!     Ok(())
//! }
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod builder;
pub mod error;
pub mod executor;
pub mod key;
pub mod loader;
pub mod lock;
pub mod observability;
pub mod serialization;
pub mod shield;
pub mod strategy;
pub mod value;

// Re-exports for convenience
pub use backend::CacheBackend;
pub use builder::QueryBuilder;
pub use error::{Error, Result};
pub use executor::{ExecutorConfig, RebuildExecutor};
pub use loader::{loader_fn, FnLoader, InMemoryLoader, SourceLoader};
pub use lock::{DistributedLock, LockHandle};
pub use observability::{CacheMetrics, NoOpMetrics};
pub use shield::{CacheShield, ShieldConfig};
pub use strategy::ReadStrategy;
pub use value::CacheValue;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
