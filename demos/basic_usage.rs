//! Basic usage: penetration protection with the pass-through strategy.
//!
//! Run with: cargo run --example basic_usage

use cache_shield::{backend::InMemoryBackend, CacheShield, InMemoryLoader, ReadStrategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Shop {
    id: u64,
    name: String,
    address: String,
}

#[tokio::main]
async fn main() -> cache_shield::Result<()> {
    env_logger::init();

    // The loader stands in for the real backing source (a database, an RPC).
    let loader: InMemoryLoader<u64, Shop> = InMemoryLoader::new();
    loader.insert(
        7,
        Shop {
            id: 7,
            name: "Night Owl Coffee".to_string(),
            address: "12 Harbor Lane".to_string(),
        },
    );

    let shield = CacheShield::new(InMemoryBackend::new());
    let ttl = Duration::from_secs(1800);

    // First query misses the cache and hits the loader.
    let shop = shield
        .query("shop:", &7, &loader, ttl, ReadStrategy::PassThrough)
        .await?;
    println!("first query:  {:?} (loader calls: {})", shop, loader.load_count());

    // Second query is served from the cache.
    let shop = shield
        .query("shop:", &7, &loader, ttl, ReadStrategy::PassThrough)
        .await?;
    println!("second query: {:?} (loader calls: {})", shop, loader.load_count());

    // A nonexistent id is confirmed absent once, then answered by the
    // negative-cache marker without touching the loader again.
    let missing = shield
        .query::<_, Shop, _>("shop:", &404, &loader, ttl, ReadStrategy::PassThrough)
        .await?;
    println!("missing id:   {:?} (loader calls: {})", missing, loader.load_count());

    let missing = shield
        .query::<_, Shop, _>("shop:", &404, &loader, ttl, ReadStrategy::PassThrough)
        .await?;
    println!("missing id:   {:?} (loader calls: {})", missing, loader.load_count());

    shield.shutdown().await;
    Ok(())
}
