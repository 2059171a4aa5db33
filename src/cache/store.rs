//! Key/value store for cached JSON payloads.
//!
//! Backends report failures through [`CacheError`]; [`CacheStore`] turns every failure into
//! a logged miss or a `false` result so that callers never have to handle cache errors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cached payload is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

impl CacheError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError>;

    async fn del(&self, key: &str) -> Result<(), CacheError>;

    /// Enumerates the keys matching a Redis glob, then deletes them in one batch.
    /// Returns the number of keys removed.
    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError>;
}

/// Fail-soft handle over a cache backend. Cloning shares the backend.
#[derive(Clone)]
pub struct CacheStore {
    backend: Option<Arc<dyn CacheBackend>>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A store that never holds anything; used when caching is switched off.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.as_ref().map_or("disabled", |b| b.name())
    }

    /// Returns the cached value, or `None` on a miss or any backend failure.
    #[instrument(skip(self), fields(backend = self.backend_name()))]
    pub async fn get(&self, key: &str) -> Option<Value> {
        let backend = self.backend.as_ref()?;
        let started = Instant::now();
        let result = backend.get(key).await;
        record_duration("get", started);

        match result {
            Ok(Some(value)) => {
                metrics::counter!("itsm_cache_hit_total").increment(1);
                debug!(target = "itsm::cache", outcome = "hit", "cache lookup");
                Some(value)
            }
            Ok(None) => {
                metrics::counter!("itsm_cache_miss_total").increment(1);
                debug!(target = "itsm::cache", outcome = "miss", "cache lookup");
                None
            }
            Err(err) => {
                metrics::counter!("itsm_cache_miss_total").increment(1);
                metrics::counter!("itsm_cache_error_total", "op" => "get").increment(1);
                warn!(target = "itsm::cache", error = %err, "cache lookup failed; treating as miss");
                None
            }
        }
    }

    #[instrument(skip(self, value), fields(backend = self.backend_name(), ttl_secs = ttl.as_secs()))]
    pub async fn set(&self, key: &str, value: &Value, ttl: Duration) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        let started = Instant::now();
        let result = backend.set(key, value, ttl).await;
        record_duration("set", started);

        match result {
            Ok(()) => true,
            Err(err) => {
                metrics::counter!("itsm_cache_error_total", "op" => "set").increment(1);
                warn!(target = "itsm::cache", error = %err, "cache write failed");
                false
            }
        }
    }

    #[instrument(skip(self), fields(backend = self.backend_name()))]
    pub async fn del(&self, key: &str) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        let started = Instant::now();
        let result = backend.del(key).await;
        record_duration("del", started);

        match result {
            Ok(()) => true,
            Err(err) => {
                metrics::counter!("itsm_cache_error_total", "op" => "del").increment(1);
                warn!(target = "itsm::cache", error = %err, "cache delete failed");
                false
            }
        }
    }

    /// Deletes every key matching `pattern`. Zero matches is a successful no-op.
    #[instrument(skip(self), fields(backend = self.backend_name()))]
    pub async fn flush_pattern(&self, pattern: &str) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return true;
        };
        let started = Instant::now();
        let result = backend.delete_matching(pattern).await;
        record_duration("flush_pattern", started);

        match result {
            Ok(removed) => {
                metrics::counter!("itsm_cache_invalidated_total").increment(removed as u64);
                debug!(target = "itsm::cache", removed, "cache pattern flushed");
                true
            }
            Err(err) => {
                metrics::counter!("itsm_cache_error_total", "op" => "flush_pattern").increment(1);
                warn!(target = "itsm::cache", error = %err, "cache pattern flush failed");
                false
            }
        }
    }
}

fn record_duration(op: &'static str, started: Instant) {
    metrics::histogram!("itsm_cache_operation_seconds", "op" => op)
        .record(started.elapsed().as_secs_f64());
}
