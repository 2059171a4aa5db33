//! Cache configuration.
//!
//! Selects the backend and the default expiry applied by the cache helper.

use std::time::Duration;

pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Which store backs the response cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackendKind {
    Redis { url: String },
    Memory,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        let backend = match (settings.enabled, settings.redis_url.as_ref()) {
            (false, _) => CacheBackendKind::Disabled,
            (true, Some(url)) => CacheBackendKind::Redis {
                url: url.to_string(),
            },
            (true, None) => CacheBackendKind::Memory,
        };
        Self {
            backend,
            default_ttl: settings.default_ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSettings;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.backend, CacheBackendKind::Memory);
        assert_eq!(config.default_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn from_settings_prefers_redis_when_url_present() {
        let settings = CacheSettings {
            enabled: true,
            redis_url: Some("redis://cache:6379".parse().expect("url")),
            default_ttl: Duration::from_secs(60),
        };
        let config = CacheConfig::from(&settings);
        assert!(matches!(config.backend, CacheBackendKind::Redis { ref url } if url.starts_with("redis://cache")));
        assert_eq!(config.default_ttl, Duration::from_secs(60));
    }

    #[test]
    fn disabled_wins_over_url() {
        let settings = CacheSettings {
            enabled: false,
            redis_url: Some("redis://cache:6379".parse().expect("url")),
            default_ttl: Duration::from_secs(60),
        };
        assert_eq!(
            CacheConfig::from(&settings).backend,
            CacheBackendKind::Disabled
        );
    }
}
