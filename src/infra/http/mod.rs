//! REST surface: routing, per-route response caching, auth and request logging.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::application::{auth::AuthService, catalog::CatalogService, users::UserService};
use crate::cache::{CacheStore, ResponseCache, cache_response};

pub use error::ApiError;

pub const USERS_LIST_TTL_SECS: u64 = 300;
pub const USER_TTL_SECS: u64 = 600;
pub const SERVICES_LIST_TTL_SECS: u64 = 120;
pub const SERVICE_TTL_SECS: u64 = 300;

#[derive(Clone)]
pub struct HttpState {
    pub users: Arc<UserService>,
    pub catalog: Arc<CatalogService>,
    pub auth: Arc<AuthService>,
    pub cache: CacheStore,
    pub metrics: Option<PrometheusHandle>,
}

pub fn build_router(state: HttpState, allowed_origins: &[String]) -> Router {
    let cached = |seconds: u64| {
        from_fn_with_state(
            ResponseCache::with_ttl_secs(state.cache.clone(), seconds),
            cache_response,
        )
    };

    let protected = Router::new()
        .route(
            "/users",
            get(handlers::users::list_users)
                .layer(cached(USERS_LIST_TTL_SECS))
                .post(handlers::users::create_user),
        )
        .route(
            "/users/{id}",
            get(handlers::users::get_user)
                .layer(cached(USER_TTL_SECS))
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route(
            "/services",
            get(handlers::services::list_services)
                .layer(cached(SERVICES_LIST_TTL_SECS))
                .post(handlers::services::create_service),
        )
        .route(
            "/services/{id}",
            get(handlers::services::get_service)
                .layer(cached(SERVICE_TTL_SECS))
                .put(handlers::services::update_service)
                .delete(handlers::services::delete_service),
        )
        .route_layer(from_fn_with_state(state.clone(), auth::require_auth));

    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            )
        });

    Router::new()
        .route("/", get(handlers::system::root))
        .route("/metrics", get(handlers::system::metrics))
        .route("/auth/signin", post(handlers::auth::sign_in))
        .merge(protected)
        .with_state(state)
        .layer(from_fn(middleware::track_metrics))
        .layer(trace_layer)
        .layer(from_fn(middleware::log_responses))
        .layer(from_fn(middleware::set_request_context))
        .layer(cors_layer(allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(target = "itsm::http", origin = %origin, error = %err, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
