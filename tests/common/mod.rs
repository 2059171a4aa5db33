#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, Response, header},
};
use serde_json::Value;
use tower::ServiceExt;

use itsm::application::auth::{AuthService, TokenKeys};
use itsm::application::catalog::CatalogService;
use itsm::application::events::EventPublisher;
use itsm::application::users::UserService;
use itsm::cache::{CacheHelper, CacheStore, MemoryCacheBackend};
use itsm::infra::http::{HttpState, build_router};
use itsm::infra::memory::InMemoryRepositories;
use itsm::messaging::{MemoryBroker, MessageRelay, RelayOptions};

pub const TEST_SECRET: &[u8] = b"integration-test-secret";
// Lowest cost bcrypt accepts; keeps hashing fast in tests.
pub const TEST_BCRYPT_COST: u32 = 4;

pub struct TestApp {
    pub router: Router,
    pub broker: MemoryBroker,
    pub cache: Arc<MemoryCacheBackend>,
    pub repos: Arc<InMemoryRepositories>,
    pub keys: TokenKeys,
}

impl TestApp {
    pub fn new() -> Self {
        let repos = Arc::new(InMemoryRepositories::new());
        let cache = Arc::new(MemoryCacheBackend::new());
        let store = CacheStore::new(cache.clone());
        let helper = CacheHelper::new(store.clone());
        let broker = MemoryBroker::new();
        let relay = Arc::new(MessageRelay::new(
            Arc::new(broker.clone()),
            RelayOptions::default(),
        ));
        let events = EventPublisher::new(relay);
        let keys = TokenKeys::from_secret(TEST_SECRET, Duration::from_secs(3600));

        let state = HttpState {
            users: Arc::new(UserService::new(
                repos.clone(),
                helper.clone(),
                events.clone(),
                TEST_BCRYPT_COST,
            )),
            catalog: Arc::new(CatalogService::new(repos.clone(), helper, events)),
            auth: Arc::new(AuthService::new(repos.clone(), keys.clone())),
            cache: store,
            metrics: None,
        };
        let router = build_router(state, &["http://localhost:3001".to_string()]);

        Self {
            router,
            broker,
            cache,
            repos,
            keys,
        }
    }

    pub fn token(&self) -> String {
        self.keys
            .issue(1, "ops@example.com")
            .expect("token should be issued")
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(authed(Method::GET, uri, &self.token(), None)).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> Response<Body> {
        self.send(authed(Method::POST, uri, &self.token(), Some(body)))
            .await
    }

    pub async fn put(&self, uri: &str, body: Value) -> Response<Body> {
        self.send(authed(Method::PUT, uri, &self.token(), Some(body)))
            .await
    }

    pub async fn delete(&self, uri: &str) -> Response<Body> {
        self.send(authed(Method::DELETE, uri, &self.token(), None))
            .await
    }
}

pub fn authed(method: Method, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}
