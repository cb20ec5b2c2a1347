use crate::common::cache::CacheManager;
use crate::error::Result;
use crate::storage::CeremonyStore;
use async_trait::async_trait;
use std::time::Duration;

/// `CeremonyStore` backed by `CacheManager`. Ceremony state is a short,
/// already-serialized JSON blob, so it's cached as a plain string rather
/// than round-tripped through `CacheManager`'s generic (de)serialization.
pub struct CachedCeremonyStore {
    cache: CacheManager,
    ttl: Duration,
}

impl CachedCeremonyStore {
    pub fn new(cache: CacheManager, ttl_secs: u64) -> Self {
        Self {
            cache,
            ttl: Duration::from_secs(ttl_secs),
        }
    }
}

#[async_trait]
impl CeremonyStore for CachedCeremonyStore {
    async fn put(&self, key: &str, state_json: &str) -> Result<()> {
        self.cache
            .set_with_ttl(key, &state_json, self.ttl)
            .await
            .map_err(|e| crate::error::Error::Internal(format!("ceremony cache write failed: {}", e)))
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self
            .cache
            .get(key)
            .await
            .map_err(|e| crate::error::Error::Internal(format!("ceremony cache read failed: {}", e)))?;

        if value.is_some() {
            let _ = self.cache.delete(key).await;
        }

        Ok(value)
    }
}
