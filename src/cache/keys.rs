//! Cache key definitions.
//!
//! Response entries are keyed `"<METHOD>:<path_with_query>"`. Invalidation builds the same
//! strings for `GET` so that the keys written by the middleware and the keys evicted after a
//! mutation always agree.

use std::fmt::Display;

use axum::http::{Method, Uri};

/// Resources whose `GET` responses are cached and invalidated as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachedResource {
    Users,
    Services,
}

impl CachedResource {
    pub fn path(self) -> &'static str {
        match self {
            CachedResource::Users => "/users",
            CachedResource::Services => "/services",
        }
    }

    /// `GET:/<resource>`
    pub fn collection_key(self) -> String {
        format!("GET:{}", self.path())
    }

    /// `GET:/<resource>/<id>`
    pub fn entity_key(self, id: impl Display) -> String {
        format!("GET:{}/{id}", self.path())
    }

    /// Glob matching every query-string variant of the collection, e.g.
    /// `GET:/services?category=Software`. The `?` is escaped so it only matches literally.
    pub fn filtered_collection_pattern(self) -> String {
        format!("GET:{}\\?*", self.path())
    }

    /// Glob matching every query-string variant of one entity, e.g. `GET:/services/7?v=1`.
    pub fn entity_query_pattern(self, id: impl Display) -> String {
        format!("GET:{}/{id}\\?*", self.path())
    }
}

/// Key for a request as seen by the response cache.
pub fn request_key(method: &Method, uri: &Uri) -> String {
    let target = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    format!("{method}:{target}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::pattern::glob_match;

    #[test]
    fn request_key_keeps_query_string() {
        let uri: Uri = "/services?category=Software&status=Ativo".parse().expect("uri");
        assert_eq!(
            request_key(&Method::GET, &uri),
            "GET:/services?category=Software&status=Ativo"
        );
    }

    #[test]
    fn invalidation_keys_match_middleware_keys() {
        let list: Uri = "/users".parse().expect("uri");
        let item: Uri = "/users/42".parse().expect("uri");
        assert_eq!(
            request_key(&Method::GET, &list),
            CachedResource::Users.collection_key()
        );
        assert_eq!(
            request_key(&Method::GET, &item),
            CachedResource::Users.entity_key(42)
        );
    }

    #[test]
    fn filtered_pattern_only_matches_query_variants() {
        let pattern = CachedResource::Services.filtered_collection_pattern();
        assert!(glob_match(&pattern, "GET:/services?status=Ativo"));
        assert!(!glob_match(&pattern, "GET:/services"));
        assert!(!glob_match(&pattern, "GET:/services/7"));
        assert!(!glob_match(&pattern, "GET:/servicesX"));
    }

    #[test]
    fn entity_query_pattern_matches_only_that_entity() {
        let pattern = CachedResource::Services.entity_query_pattern(7);
        assert!(glob_match(&pattern, "GET:/services/7?v=1"));
        assert!(!glob_match(&pattern, "GET:/services/7"));
        assert!(!glob_match(&pattern, "GET:/services/70?v=1"));
        assert!(!glob_match(&pattern, "GET:/services?id=7"));
    }
}
