//! Shared helpers for router-level integration tests
#![allow(dead_code)]

use axum::{
    body::Body,
    extract::connect_info::ConnectInfo,
    http::{header, Method, Request, Response},
    Router,
};
use hopline::analytics::GeoIpService;
use hopline::cache::MemoryLinkCache;
use hopline::config::Config;
use hopline::counter::MemoryCounterStore;
use hopline::recorder::{AccessSink, EventRecorder};
use hopline::storage::{SqliteStorage, Storage};
use hopline::{build_router, Services};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::{Layer, ServiceExt};

pub const DEFAULT_CLIENT: [u8; 4] = [127, 0, 0, 1];

pub struct TestApp {
    pub router: Router,
    pub services: Services,
    pub config: Config,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .layer(TestConnectInfoLayer)
            .oneshot(request)
            .await
            .unwrap()
    }

    /// Wait until the recorder has written every queued event.
    pub async fn flush_events(&self) {
        self.services.recorder.shutdown().await;
    }

    /// A new process over the same database: empty cache, empty counters.
    pub fn restart(&self) -> TestApp {
        let services = Services::with_stores(
            Arc::clone(&self.services.storage),
            Arc::new(MemoryLinkCache::new(self.config.cache.max_entries)),
            Arc::new(MemoryCounterStore::new()),
            &self.config,
        )
        .unwrap();
        TestApp {
            router: build_router(&services, &self.config),
            services,
            config: self.config.clone(),
        }
    }
}

/// App on an in-memory database with in-process cache and counters.
/// The request limit is raised so that API tests are not throttled.
pub async fn spawn_app() -> TestApp {
    let mut config = Config::default();
    config.rate_limit.max_requests = 10_000;
    spawn_app_with(config).await
}

async fn memory_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

pub async fn spawn_app_with(config: Config) -> TestApp {
    let storage = memory_storage().await;

    let services = Services::with_stores(
        storage,
        Arc::new(MemoryLinkCache::new(config.cache.max_entries)),
        Arc::new(MemoryCounterStore::new()),
        &config,
    )
    .unwrap();
    let router = build_router(&services, &config);

    TestApp {
        router,
        services,
        config,
    }
}

/// App whose access events go to `sink` instead of the database.
pub async fn spawn_app_with_sink(sink: Arc<dyn AccessSink>) -> TestApp {
    let mut config = Config::default();
    config.rate_limit.max_requests = 10_000;

    let services = Services {
        storage: memory_storage().await,
        cache: Arc::new(MemoryLinkCache::new(config.cache.max_entries)),
        counters: Arc::new(MemoryCounterStore::new()),
        recorder: Arc::new(EventRecorder::new(sink, &config.recorder)),
        geoip: GeoIpService::new(None).unwrap(),
    };
    let router = build_router(&services, &config);

    TestApp {
        router,
        services,
        config,
    }
}

/// Supplies a peer address unless the request already carries one.
#[derive(Clone)]
pub struct TestConnectInfoLayer;

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware { inner }
    }
}

#[derive(Clone)]
pub struct TestConnectInfoMiddleware<S> {
    inner: S,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if req.extensions().get::<ConnectInfo<SocketAddr>>().is_none() {
            let addr = SocketAddr::from((DEFAULT_CLIENT, 12345));
            req.extensions_mut().insert(ConnectInfo(addr));
        }
        self.inner.call(req)
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// GET from a specific client address.
pub fn get_from(uri: &str, client: [u8; 4]) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .extension(ConnectInfo(SocketAddr::from((client, 40000))))
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(
    method: Method,
    uri: &str,
    body: serde_json::Value,
    api_key: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = api_key {
        builder = builder.header("X-API-Key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn authed(method: Method, uri: &str, api_key: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("X-API-Key", api_key)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

pub fn cache_status(response: &Response<Body>) -> &str {
    response
        .headers()
        .get("x-hopline-cache")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Register a user through the API and return its id and initial key.
pub async fn register(app: &TestApp, username: &str) -> (i64, String) {
    let response = app
        .send(json_request(
            Method::POST,
            "/users",
            serde_json::json!({ "username": username, "email": format!("{username}@example.com") }),
            None,
        ))
        .await;
    assert_eq!(response.status(), 201);
    let body = body_json(response).await;
    (
        body["id"].as_i64().unwrap(),
        body["api_key"].as_str().unwrap().to_string(),
    )
}
