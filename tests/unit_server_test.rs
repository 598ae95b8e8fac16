// tests/unit_server_test.rs

use async_trait::async_trait;
use axum::extract::State;
use bytes::Bytes;
use http::{HeaderMap, Method, header};
use pixelgate::config::Config;
use pixelgate::core::coordinator::{BucketStorages, Coordinator, CoordinatorSettings};
use pixelgate::core::engine::ImageEngine;
use pixelgate::core::errors::GatewayError;
use pixelgate::core::object::Transform;
use pixelgate::core::storage::{MemoryStorage, Storage};
use pixelgate::core::{Deadline, Response};
use pixelgate::server::{AppState, Dispatcher, HeaderOverrideHook, RequestHook, handlers};
use std::collections::HashMap;
use std::sync::Arc;

/// No request in these tests reaches the engine.
struct NullEngine;

#[async_trait]
impl ImageEngine for NullEngine {
    async fn process(
        &self,
        _input: Response,
        _transforms: &[Transform],
        _deadline: Deadline,
    ) -> Result<Response, GatewayError> {
        Err(GatewayError::TransformFailure("no engine in this test".to_string()))
    }
}

fn test_state() -> (Arc<AppState>, Arc<MemoryStorage>) {
    let config: Config = toml::from_str(
        r#"
        [server]
        request_timeout = "5s"

        [[headers]]
        status_codes = [200]
        values = { cache-control = "max-age=84600, public" }

        [buckets.demo]
        strategy = "query"
        [buckets.demo.storage.basic]
        kind = "memory"
        "#,
    )
    .unwrap();
    config.validate().unwrap();

    let storage = Arc::new(MemoryStorage::new());
    let storage_dyn: Arc<dyn Storage> = Arc::clone(&storage) as Arc<dyn Storage>;
    let mut buckets = HashMap::new();
    buckets.insert(
        "demo".to_string(),
        BucketStorages {
            basic: Arc::clone(&storage_dyn),
            transforms: storage_dyn,
        },
    );

    let settings = CoordinatorSettings {
        cache_max_entries: config.cache.max_entries,
        concurrency: config.processing.concurrency,
        lock_timeout: config.server.lock_timeout(),
        success_ttl: config.cache.success_ttl,
        placeholder_ttl: config.cache.placeholder_ttl,
        error_ttl: config.cache.error_ttl,
        writeback_timeout: config.processing.writeback_timeout,
    };
    let coordinator = Arc::new(Coordinator::new(buckets, Arc::new(NullEngine), None, settings));
    let dispatcher = Dispatcher::new(coordinator, config.server.queue_len);
    let hooks: Vec<Box<dyn RequestHook>> =
        vec![Box::new(HeaderOverrideHook::from_config(&config.headers))];

    let state = Arc::new(AppState {
        config: Arc::new(config),
        dispatcher,
        hooks,
    });
    (state, storage)
}

async fn send(
    state: &Arc<AppState>,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
) -> axum::response::Response {
    let mut builder = http::Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(axum::body::Body::empty()).unwrap();
    handlers::handle(State(Arc::clone(state)), request).await
}

async fn body_bytes(response: axum::response::Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

async fn seed(storage: &MemoryStorage, path: &str, body: &'static [u8]) {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, "image/jpeg".parse().unwrap());
    storage.put(path, &headers, Bytes::from_static(body)).await;
}

#[tokio::test]
async fn test_get_serves_object_with_header_overrides() {
    let (state, storage) = test_state();
    seed(&storage, "/img.jpg", b"jpeg-bytes").await;

    let response = send(&state, Method::GET, "/demo/img.jpg", &[]).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("max-age=84600, public")
    );
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok()),
        Some("10")
    );
    assert_eq!(body_bytes(response).await, Bytes::from_static(b"jpeg-bytes"));
}

#[tokio::test]
async fn test_head_advertises_length_without_body() {
    let (state, storage) = test_state();
    seed(&storage, "/img.jpg", b"jpeg-bytes").await;

    let response = send(&state, Method::HEAD, "/demo/img.jpg", &[]).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok()),
        Some("10")
    );
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_if_none_match_revalidation() {
    let (state, storage) = test_state();
    seed(&storage, "/img.jpg", b"jpeg-bytes").await;

    let first = send(&state, Method::GET, "/demo/img.jpg", &[]).await;
    let etag = first
        .headers()
        .get(header::ETAG)
        .and_then(|v| v.to_str().ok())
        .expect("stored objects carry an etag")
        .to_string();

    let second = send(
        &state,
        Method::GET,
        "/demo/img.jpg",
        &[("if-none-match", etag.as_str())],
    )
    .await;
    assert_eq!(second.status(), 304);
    assert!(body_bytes(second).await.is_empty());

    // A non-matching validator still gets the full object.
    let third = send(
        &state,
        Method::GET,
        "/demo/img.jpg",
        &[("if-none-match", "\"different\"")],
    )
    .await;
    assert_eq!(third.status(), 200);
}

#[tokio::test]
async fn test_location_constraint_document() {
    let (state, _storage) = test_state();
    let response = send(&state, Method::GET, "/demo?location", &[]).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("application/xml")
    );
    let body = body_bytes(response).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("<LocationConstraint"));
    assert!(text.contains(">EU<"));
}

#[tokio::test]
async fn test_bucket_listing_endpoint() {
    let (state, storage) = test_state();
    seed(&storage, "/a.jpg", b"a").await;
    seed(&storage, "/b.jpg", b"b").await;

    let response = send(&state, Method::GET, "/demo?max-keys=1", &[]).await;
    assert_eq!(response.status(), 200);
    let text = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
    assert!(text.contains("<Key>a.jpg</Key>"));
    assert!(!text.contains("<Key>b.jpg</Key>"));
    assert!(text.contains("<IsTruncated>true</IsTruncated>"));
}

#[tokio::test]
async fn test_unknown_bucket_and_missing_object() {
    let (state, _storage) = test_state();
    let response = send(&state, Method::GET, "/nope/img.jpg", &[]).await;
    assert_eq!(response.status(), 404);

    let response = send(&state, Method::GET, "/demo/absent.jpg", &[]).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_unsupported_method() {
    let (state, _storage) = test_state();
    let response = send(&state, Method::PATCH, "/demo/img.jpg", &[]).await;
    assert_eq!(response.status(), 405);
}
