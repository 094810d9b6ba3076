//! Builder pattern for configuring individual queries.

use crate::backend::CacheBackend;
use crate::error::Result;
use crate::loader::SourceLoader;
use crate::shield::CacheShield;
use crate::strategy::ReadStrategy;
use crate::value::CacheValue;
use std::fmt::Display;
use std::time::Duration;

/// Fluent configuration for a single protected query.
///
/// # Example
///
/// ```ignore
/// let shop = shield
///     .builder()
///     .with_strategy(ReadStrategy::MutexGuarded)
///     .with_ttl(Duration::from_secs(300))
///     .execute("shop:", &id, &loader)
///     .await?;
/// ```
pub struct QueryBuilder<'a, B: CacheBackend> {
    shield: &'a CacheShield<B>,
    strategy: ReadStrategy,
    ttl: Option<Duration>,
}

impl<'a, B: CacheBackend> QueryBuilder<'a, B> {
    pub(crate) fn new(shield: &'a CacheShield<B>) -> Self {
        Self {
            shield,
            strategy: ReadStrategy::default(),
            ttl: None,
        }
    }

    /// Set the read strategy. Defaults to [`ReadStrategy::PassThrough`].
    pub fn with_strategy(mut self, strategy: ReadStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Override the positive TTL for this query. Defaults to the shield's
    /// configured `default_ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Run the query.
    ///
    /// # Errors
    ///
    /// Same contract as [`CacheShield::query`].
    pub async fn execute<ID, T, L>(
        self,
        prefix: &str,
        id: &ID,
        loader: &L,
    ) -> Result<Option<T>>
    where
        ID: Display + Clone + Send + Sync + 'static,
        T: CacheValue + 'static,
        L: SourceLoader<ID, T> + Clone + 'static,
    {
        let ttl = self.ttl.unwrap_or(self.shield.config.default_ttl);
        self.shield
            .query(prefix, id, loader, ttl, self.strategy)
            .await
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::loader::InMemoryLoader;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Shop {
        id: u64,
        name: String,
    }

    fn loader_with_shop() -> InMemoryLoader<u64, Shop> {
        let loader = InMemoryLoader::new();
        loader.insert(
            1,
            Shop {
                id: 1,
                name: "bakery".to_string(),
            },
        );
        loader
    }

    #[tokio::test]
    async fn test_builder_defaults_to_pass_through() {
        let shield = CacheShield::new(InMemoryBackend::new());
        let loader = loader_with_shop();

        let result = shield
            .builder()
            .execute::<_, Shop, _>("shop:", &1, &loader)
            .await
            .unwrap();

        assert_eq!(result.unwrap().name, "bakery");
        assert_eq!(loader.load_count(), 1);
    }

    #[tokio::test]
    async fn test_builder_with_strategy() {
        let shield = CacheShield::new(InMemoryBackend::new());
        let loader = loader_with_shop();

        let result = shield
            .builder()
            .with_strategy(ReadStrategy::MutexGuarded)
            .execute::<_, Shop, _>("shop:", &1, &loader)
            .await
            .unwrap();

        assert_eq!(result.unwrap().name, "bakery");
    }

    #[tokio::test]
    async fn test_builder_ttl_override_applies_to_the_entry() {
        let shield = CacheShield::new(InMemoryBackend::new());
        let loader = loader_with_shop();

        shield
            .builder()
            .with_ttl(Duration::from_millis(40))
            .execute::<_, Shop, _>("shop:", &1, &loader)
            .await
            .unwrap();
        assert_eq!(loader.load_count(), 1);

        // Entry expires with the overridden ttl, so the loader runs again.
        tokio::time::sleep(Duration::from_millis(80)).await;
        shield
            .builder()
            .execute::<_, Shop, _>("shop:", &1, &loader)
            .await
            .unwrap();
        assert_eq!(loader.load_count(), 2);
    }

    #[tokio::test]
    async fn test_builder_chaining() {
        let shield = CacheShield::new(InMemoryBackend::new());
        let loader = loader_with_shop();

        let result = shield
            .builder()
            .with_strategy(ReadStrategy::MutexGuarded)
            .with_ttl(Duration::from_secs(300))
            .execute::<_, Shop, _>("shop:", &1, &loader)
            .await
            .unwrap();

        assert!(result.is_some());
    }
}
