//! Response cache.
//!
//! - [`store`]: fail-soft key/value store over a pluggable backend (Redis or in-process)
//! - [`middleware`]: per-route read-through cache keyed by method and URI
//! - [`helper`]: explicit lookups and invalidation used by services after mutations
//!
//! Keys are `"<METHOD>:<path_with_query>"`; see [`keys`].

mod config;
mod helper;
mod keys;
mod memory;
mod middleware;
mod pattern;
mod redis;
mod store;

use std::sync::Arc;

use tracing::info;

pub use config::{CacheBackendKind, CacheConfig, DEFAULT_TTL_SECS};
pub use helper::{CacheHelper, Cached};
pub use keys::{CachedResource, request_key};
pub use memory::MemoryCacheBackend;
pub use middleware::{CACHE_STATUS_HEADER, CACHED_AT_HEADER, ResponseCache, cache_response};
pub use pattern::glob_match;
pub use redis::RedisCacheBackend;
pub use store::{CacheBackend, CacheError, CacheStore};

/// Builds the store selected by `config`. Redis is connected lazily on first use.
pub fn build_store(config: &CacheConfig) -> Result<CacheStore, CacheError> {
    let store = match &config.backend {
        CacheBackendKind::Redis { url } => {
            CacheStore::new(Arc::new(RedisCacheBackend::open(url)?))
        }
        CacheBackendKind::Memory => CacheStore::new(Arc::new(MemoryCacheBackend::new())),
        CacheBackendKind::Disabled => CacheStore::disabled(),
    };
    info!(
        target = "itsm::cache",
        backend = store.backend_name(),
        default_ttl_secs = config.default_ttl.as_secs(),
        "cache store ready"
    );
    Ok(store)
}
