//! Logical expiry: serve stale immediately, rebuild in the background.
//!
//! Run with: cargo run --example stale_while_revalidate

use cache_shield::{backend::InMemoryBackend, CacheShield, InMemoryLoader, ReadStrategy};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Price {
    shop_id: u64,
    cents: u64,
}

#[tokio::main]
async fn main() -> cache_shield::Result<()> {
    env_logger::init();

    // A deliberately slow backing source.
    let loader: InMemoryLoader<u64, Price> =
        InMemoryLoader::new().with_latency(Duration::from_millis(300));
    loader.insert(7, Price { shop_id: 7, cents: 450 });

    let shield = CacheShield::new(InMemoryBackend::new());
    let ttl = Duration::from_millis(200);

    // Pre-warm the entry; logical expiry never loads synchronously.
    shield
        .set_with_logical_expiry("price:", &7, &Price { shop_id: 7, cents: 400 }, ttl)
        .await?;

    // Fresh read.
    let started = Instant::now();
    let price = shield
        .query("price:", &7, &loader, ttl, ReadStrategy::LogicalExpiry)
        .await?;
    println!("fresh:   {:?} in {:?}", price, started.elapsed());

    // Let the entry expire, then read again: the stale value comes back
    // immediately even though the loader takes 300ms.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let started = Instant::now();
    let price = shield
        .query("price:", &7, &loader, ttl, ReadStrategy::LogicalExpiry)
        .await?;
    println!("stale:   {:?} in {:?}", price, started.elapsed());

    // Give the background rebuild time to finish and read once more.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let price = shield
        .query("price:", &7, &loader, ttl, ReadStrategy::LogicalExpiry)
        .await?;
    println!("rebuilt: {:?} (loader calls: {})", price, loader.load_count());

    shield.shutdown().await;
    Ok(())
}
