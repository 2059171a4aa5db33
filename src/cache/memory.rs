//! In-process cache backend used when no Redis URL is configured, and by tests.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use crate::util::lock;

use super::pattern::glob_match;
use super::store::{CacheBackend, CacheError};

const OWNER: &str = "cache::memory";

struct Entry {
    value: Value,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        lock::read(&self.entries, OWNER, "len")
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = lock::read(&self.entries, OWNER, "keys")
            .iter()
            .filter(|(_, entry)| entry.expires_at > now)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = Instant::now();
        {
            let entries = lock::read(&self.entries, OWNER, "get");
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired: drop it so the map does not grow without bound.
        let mut entries = lock::write(&self.entries, OWNER, "get.expire");
        if entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            value: value.clone(),
            expires_at: Instant::now() + ttl,
        };
        lock::write(&self.entries, OWNER, "set").insert(key.to_string(), entry);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        lock::write(&self.entries, OWNER, "del").remove(key);
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut entries = lock::write(&self.entries, OWNER, "delete_matching");
        let matching: Vec<String> = entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        for key in &matching {
            entries.remove(key);
        }
        Ok(matching.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::cache::CacheStore;

    #[tokio::test(start_paused = true)]
    async fn values_expire_after_ttl() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let store = CacheStore::new(backend.clone());
        let value = json!({"id": 1, "name": "VPN"});

        assert!(store.set("GET:/services/1", &value, Duration::from_secs(120)).await);
        tokio::time::advance(Duration::from_secs(119)).await;
        assert_eq!(store.get("GET:/services/1").await, Some(value));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("GET:/services/1").await, None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn del_removes_entry() {
        let store = CacheStore::new(Arc::new(MemoryCacheBackend::new()));
        store.set("k", &json!(true), Duration::from_secs(60)).await;
        assert!(store.del("k").await);
        assert_eq!(store.get("k").await, None);
        assert!(store.del("k").await, "deleting a missing key still succeeds");
    }

    #[tokio::test]
    async fn flush_pattern_clears_only_matching_keys() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let store = CacheStore::new(backend.clone());
        let ttl = Duration::from_secs(60);
        for key in [
            "GET:/services",
            "GET:/services/1",
            "GET:/services?status=Ativo",
            "GET:/users",
        ] {
            store.set(key, &json!([]), ttl).await;
        }

        assert!(store.flush_pattern("GET:/services*").await);
        assert_eq!(backend.keys(), vec!["GET:/users".to_string()]);
    }

    #[tokio::test]
    async fn flush_pattern_with_no_matches_succeeds() {
        let store = CacheStore::new(Arc::new(MemoryCacheBackend::new()));
        assert!(store.flush_pattern("GET:/services").await);
    }
}
