//! Read-through response cache middleware.
//!
//! Mounted per route with its own TTL. A hit answers from the store without running the
//! handler; a miss runs the handler and stores the body when the handler returned exactly
//! `200 OK` with a JSON payload.

use std::time::Duration;

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::State,
    http::{HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, instrument, warn};

use super::{keys::request_key, store::CacheStore};

pub const CACHE_STATUS_HEADER: &str = "x-cache";
pub const CACHED_AT_HEADER: &str = "x-cached-at";

/// State for one cached route.
#[derive(Clone)]
pub struct ResponseCache {
    pub store: CacheStore,
    pub ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: CacheStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn with_ttl_secs(store: CacheStore, seconds: u64) -> Self {
        Self::new(store, Duration::from_secs(seconds))
    }
}

#[instrument(skip_all, fields(key = tracing::field::Empty, ttl_secs = cache.ttl.as_secs()))]
pub async fn cache_response(
    State(cache): State<ResponseCache>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.store.is_enabled() {
        return next.run(request).await;
    }

    let key = request_key(request.method(), request.uri());
    tracing::Span::current().record("key", key.as_str());

    if let Some(payload) = cache.store.get(&key).await {
        debug!(target = "itsm::cache::middleware", outcome = "hit", "serving cached response");
        return cached_response(payload);
    }

    debug!(target = "itsm::cache::middleware", outcome = "miss", "cache miss, executing handler");
    let response = next.run(request).await;

    if response.status() != StatusCode::OK || !is_json(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            // The body is consumed at this point and cannot be handed back.
            metrics::counter!("itsm_cache_error_total", "op" => "buffer").increment(1);
            warn!(
                target = "itsm::cache::middleware",
                key = %key,
                error = %err,
                "response body could not be buffered; skipping cache"
            );
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            response
                .headers_mut()
                .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("BYPASS"));
            return response;
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(payload) => {
            cache.store.set(&key, &payload, cache.ttl).await;
        }
        Err(err) => {
            warn!(target = "itsm::cache::middleware", error = %err, "response body is not JSON; skipping cache");
        }
    }

    let mut response = Response::from_parts(parts, Body::from(bytes));
    response
        .headers_mut()
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("MISS"));
    response
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

/// Rebuilds a hit. Object payloads gain `_cached` and `_cachedAt`; other JSON values are
/// returned unchanged and only the headers mark them as cached.
fn cached_response(payload: Value) -> Response {
    let cached_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    let body = match payload {
        Value::Object(mut fields) => {
            fields.insert("_cached".to_string(), Value::Bool(true));
            fields.insert("_cachedAt".to_string(), Value::String(cached_at.clone()));
            Value::Object(fields)
        }
        other => other,
    };

    let mut response = (StatusCode::OK, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static("HIT"));
    if let Ok(value) = HeaderValue::from_str(&cached_at) {
        headers.insert(CACHED_AT_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use axum::{Router, middleware::from_fn_with_state, routing::get};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::cache::MemoryCacheBackend;

    fn counted_router(store: CacheStore, calls: Arc<AtomicUsize>, status: StatusCode) -> Router {
        let handler = move || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                (status, Json(json!({"calls": n, "items": ["vpn", "email"]})))
            }
        };
        Router::new().route(
            "/services",
            get(handler).layer(from_fn_with_state(
                ResponseCache::with_ttl_secs(store, 120),
                cache_response,
            )),
        )
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let store = CacheStore::new(Arc::new(MemoryCacheBackend::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let app = counted_router(store, calls.clone(), StatusCode::OK);

        let first = app.clone().oneshot(get_request("/services")).await.expect("first");
        assert_eq!(first.headers()[CACHE_STATUS_HEADER], "MISS");
        let first_body = body_json(first).await;
        assert!(first_body.get("_cached").is_none());

        let second = app.oneshot(get_request("/services")).await.expect("second");
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.headers()[CACHE_STATUS_HEADER], "HIT");
        let mut second_body = body_json(second).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_body["_cached"], json!(true));
        assert!(second_body["_cachedAt"].is_string());

        let fields = second_body.as_object_mut().expect("object");
        fields.remove("_cached");
        fields.remove("_cachedAt");
        assert_eq!(second_body, first_body);
    }

    #[tokio::test]
    async fn query_strings_are_cached_separately() {
        let store = CacheStore::new(Arc::new(MemoryCacheBackend::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let app = counted_router(store, calls.clone(), StatusCode::OK);

        app.clone()
            .oneshot(get_request("/services?status=Ativo"))
            .await
            .expect("filtered");
        app.oneshot(get_request("/services")).await.expect("plain");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_200_responses_are_not_cached() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let store = CacheStore::new(backend.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let app = counted_router(store, calls.clone(), StatusCode::CREATED);

        app.clone().oneshot(get_request("/services")).await.expect("first");
        app.oneshot(get_request("/services")).await.expect("second");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn disabled_store_passes_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = counted_router(CacheStore::disabled(), calls.clone(), StatusCode::OK);

        app.clone().oneshot(get_request("/services")).await.expect("first");
        let second = app.oneshot(get_request("/services")).await.expect("second");
        assert!(second.headers().get(CACHE_STATUS_HEADER).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreadable_body_is_not_cached() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let store = CacheStore::new(backend.clone());
        let handler = || async {
            let chunks = futures::stream::iter(vec![Err::<bytes::Bytes, _>(std::io::Error::other(
                "connection reset",
            ))]);
            (
                [(header::CONTENT_TYPE, "application/json")],
                Body::from_stream(chunks),
            )
        };
        let app = Router::new().route(
            "/services",
            get(handler).layer(from_fn_with_state(
                ResponseCache::with_ttl_secs(store, 120),
                cache_response,
            )),
        );

        let response = app.oneshot(get_request("/services")).await.expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CACHE_STATUS_HEADER], "BYPASS");
        assert!(backend.is_empty());
    }

    #[test]
    fn array_hits_are_returned_unchanged() {
        let response = cached_response(json!([1, 2]));
        assert_eq!(response.headers()[CACHE_STATUS_HEADER], "HIT");
        assert!(response.headers().contains_key(CACHED_AT_HEADER));
    }
}
