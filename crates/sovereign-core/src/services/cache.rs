//! Content cache with lazy expiry and periodic sweep.

use std::time::Duration;

use crate::models::CachedContent;
use crate::services::Store;
use crate::util::now_millis;
use crate::Result;

/// Get/put/evict semantics over the store's content collection.
///
/// Callers never observe an entry whose `expires_at` is in the past: reads
/// filter and delete stale entries, and [`CacheManager::sweep_expired`]
/// reclaims the ones nobody reads again.
#[derive(Clone)]
pub struct CacheManager {
    store: Store,
}

impl CacheManager {
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Insert or overwrite an entry by id.
    pub async fn put(&self, content: &CachedContent) -> Result<()> {
        self.store.put_content(content).await
    }

    /// Cache `data` under `id`, fresh from now for `ttl`.
    pub async fn put_with_ttl(
        &self,
        id: &str,
        content_type: &str,
        data: serde_json::Value,
        ttl: Duration,
    ) -> Result<CachedContent> {
        let content = CachedContent::with_ttl(id, content_type, data, now_millis(), ttl);
        self.store.put_content(&content).await?;
        Ok(content)
    }

    /// Read an entry, evicting it instead if it has expired.
    pub async fn get(&self, id: &str) -> Result<Option<CachedContent>> {
        let Some(content) = self.store.get_content(id).await? else {
            return Ok(None);
        };

        let now = now_millis();
        if content.is_expired_at(now) {
            tracing::debug!("Evicting expired cache entry {}", id);
            self.store.evict_content_if_expired(id, now).await?;
            return Ok(None);
        }

        Ok(Some(content))
    }

    /// All live entries of one type.
    pub async fn get_by_type(&self, content_type: &str) -> Result<Vec<CachedContent>> {
        let now = now_millis();
        Ok(self
            .store
            .list_content_by_type(content_type)
            .await?
            .into_iter()
            .filter(|content| !content.is_expired_at(now))
            .collect())
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        self.store.delete_content(id).await
    }

    /// Delete every expired entry; returns how many were removed.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let removed = self.store.delete_expired_content(now_millis()).await?;
        if removed > 0 {
            tracing::info!("Swept {} expired cache entries", removed);
        }
        Ok(removed)
    }
}
