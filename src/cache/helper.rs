//! Explicit cache access for services: read-through lookups and post-mutation eviction.

use std::future::Future;
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};

use super::{config::DEFAULT_TTL_SECS, keys::CachedResource, store::CacheStore};

/// Result of [`CacheHelper::get_cached`].
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub data: T,
    pub from_cache: bool,
}

#[derive(Clone)]
pub struct CacheHelper {
    store: CacheStore,
    default_ttl: Duration,
}

impl CacheHelper {
    pub fn new(store: CacheStore) -> Self {
        Self::with_default_ttl(store, Duration::from_secs(DEFAULT_TTL_SECS))
    }

    pub fn with_default_ttl(store: CacheStore, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the cached value for `key`, or runs `fetch`, stores its result and returns it.
    ///
    /// A cached payload that no longer deserializes into `T` counts as a miss. Errors from
    /// `fetch` are returned untouched and nothing is stored.
    pub async fn get_cached<T, E, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        ttl: Option<Duration>,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(payload) = self.store.get(key).await {
            match serde_json::from_value::<T>(payload) {
                Ok(data) => {
                    return Ok(Cached {
                        data,
                        from_cache: true,
                    });
                }
                Err(err) => {
                    warn!(target = "itsm::cache::helper", key, error = %err, "discarding undecodable cache entry");
                }
            }
        }

        let data = fetch().await?;
        self.set_value(key, &data, ttl).await;
        Ok(Cached {
            data,
            from_cache: false,
        })
    }

    /// Deletes every key matching `pattern`.
    pub async fn invalidate(&self, pattern: &str) -> bool {
        let flushed = self.store.flush_pattern(pattern).await;
        debug!(target = "itsm::cache::helper", pattern, flushed, "cache invalidated");
        flushed
    }

    /// Evicts the collection key and its query-string variants. With an id it also evicts the
    /// entity key and that entity's query-string variants.
    pub async fn invalidate_resource(
        &self,
        resource: CachedResource,
        id: Option<i64>,
    ) -> bool {
        let mut ok = self.store.del(&resource.collection_key()).await || !self.store.is_enabled();
        ok &= self
            .invalidate(&resource.filtered_collection_pattern())
            .await;
        if let Some(id) = id {
            ok &= self.store.del(&resource.entity_key(id)).await || !self.store.is_enabled();
            ok &= self.invalidate(&resource.entity_query_pattern(id)).await;
        }
        ok
    }

    pub async fn set_value<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        let payload = match serde_json::to_value(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(target = "itsm::cache::helper", key, error = %err, "value is not serializable; skipping cache");
                return false;
            }
        };
        self.store
            .set(key, &payload, ttl.unwrap_or(self.default_ttl))
            .await
    }

    pub async fn get_value(&self, key: &str) -> Option<Value> {
        self.store.get(key).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::cache::MemoryCacheBackend;

    fn helper() -> (CacheHelper, Arc<MemoryCacheBackend>) {
        let backend = Arc::new(MemoryCacheBackend::new());
        (CacheHelper::new(CacheStore::new(backend.clone())), backend)
    }

    #[tokio::test]
    async fn get_cached_fetches_once() {
        let (helper, _) = helper();
        let first = helper
            .get_cached("report:daily", || async { Ok::<_, String>(vec![1, 2, 3]) }, None)
            .await
            .expect("first");
        assert!(!first.from_cache);

        let second = helper
            .get_cached(
                "report:daily",
                || async { Err::<Vec<i32>, _>("fetch should not run".to_string()) },
                None,
            )
            .await
            .expect("second");
        assert!(second.from_cache);
        assert_eq!(second.data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn fetch_errors_are_not_cached() {
        let (helper, backend) = helper();
        let result = helper
            .get_cached("k", || async { Err::<i32, _>("db down") }, None)
            .await;
        assert_eq!(result, Err("db down"));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn invalidate_resource_clears_entity_collection_and_filters() {
        let (helper, backend) = helper();
        for key in [
            "GET:/services",
            "GET:/services/7",
            "GET:/services/70",
            "GET:/services/7?v=1",
            "GET:/services/70?v=1",
            "GET:/services?category=Software",
            "GET:/users",
        ] {
            helper.set_value(key, &json!({}), None).await;
        }

        assert!(
            helper
                .invalidate_resource(CachedResource::Services, Some(7))
                .await
        );
        assert_eq!(
            backend.keys(),
            vec![
                "GET:/services/70".to_string(),
                "GET:/services/70?v=1".to_string(),
                "GET:/users".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn invalidate_with_no_matching_keys_succeeds() {
        let (helper, _) = helper();
        assert!(helper.invalidate("GET:/services").await);
    }

    #[tokio::test]
    async fn values_round_trip_through_get_value() {
        let (helper, _) = helper();
        assert!(helper.set_value("stats", &json!({"open": 3}), Some(Duration::from_secs(5))).await);
        assert_eq!(helper.get_value("stats").await, Some(json!({"open": 3})));
    }
}
