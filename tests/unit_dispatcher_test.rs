// tests/unit_dispatcher_test.rs

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, header};
use pixelgate::core::coordinator::{
    BucketStorages, Coordinator, CoordinatorSettings, GatewayRequest,
};
use pixelgate::core::engine::ImageEngine;
use pixelgate::core::errors::GatewayError;
use pixelgate::core::object::{ImageObject, Transform};
use pixelgate::core::storage::{MemoryStorage, Storage};
use pixelgate::core::{Deadline, Response};
use pixelgate::server::Dispatcher;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// An engine that never gets invoked in these tests.
struct PanicEngine;

#[async_trait]
impl ImageEngine for PanicEngine {
    async fn process(
        &self,
        _input: Response,
        _transforms: &[Transform],
        _deadline: Deadline,
    ) -> Result<Response, GatewayError> {
        panic!("engine must not run in dispatcher tests");
    }
}

/// A storage that stalls every read, for deadline tests.
struct StallingStorage {
    inner: MemoryStorage,
    delay: Duration,
}

#[async_trait]
impl Storage for StallingStorage {
    async fn get(&self, path: &str) -> Response {
        tokio::time::sleep(self.delay).await;
        self.inner.get(path).await
    }

    async fn head(&self, path: &str) -> Response {
        tokio::time::sleep(self.delay).await;
        self.inner.head(path).await
    }

    async fn put(&self, path: &str, headers: &HeaderMap, body: Bytes) -> Response {
        self.inner.put(path, headers, body).await
    }

    async fn delete(&self, path: &str) -> Response {
        self.inner.delete(path).await
    }

    async fn list(
        &self,
        opts: &pixelgate::core::storage::ListOptions,
    ) -> Result<pixelgate::core::storage::ObjectListing, GatewayError> {
        self.inner.list(opts).await
    }
}

fn coordinator_over(storage: Arc<dyn Storage>) -> Arc<Coordinator> {
    let mut buckets = HashMap::new();
    buckets.insert(
        "demo".to_string(),
        BucketStorages {
            basic: Arc::clone(&storage),
            transforms: storage,
        },
    );
    Arc::new(Coordinator::new(
        buckets,
        Arc::new(PanicEngine),
        None,
        CoordinatorSettings::default(),
    ))
}

fn plain_get(path: &str) -> GatewayRequest {
    GatewayRequest {
        method: Method::GET,
        object: ImageObject::plain("demo", path),
        headers: HeaderMap::new(),
        body: Bytes::new(),
        list: None,
    }
}

#[tokio::test]
async fn test_submit_returns_worker_response() {
    let storage = Arc::new(MemoryStorage::new());
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, "image/jpeg".parse().unwrap());
    storage
        .put("/img.jpg", &headers, Bytes::from_static(b"body"))
        .await;

    let dispatcher = Dispatcher::new(coordinator_over(storage), 16);
    let response = dispatcher
        .submit(plain_get("/img.jpg"), Deadline::after(Duration::from_secs(5)))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(
        response.into_body_bytes().await.unwrap(),
        Bytes::from_static(b"body")
    );
}

#[tokio::test]
async fn test_expired_deadline_synthesizes_client_cancel() {
    let storage = Arc::new(StallingStorage {
        inner: MemoryStorage::new(),
        delay: Duration::from_millis(500),
    });

    let dispatcher = Dispatcher::new(coordinator_over(storage), 16);
    let started = Instant::now();
    let response = dispatcher
        .submit(
            plain_get("/img.jpg"),
            Deadline::after(Duration::from_millis(100)),
        )
        .await;

    // The dispatcher and the worker race the same instant; either the
    // synthetic 499 or the worker's own 504 is acceptable, but never the
    // stalled storage result.
    assert!(response.status == 499 || response.status == 504);
    assert!(started.elapsed() < Duration::from_millis(450));
}

#[tokio::test]
async fn test_many_concurrent_submissions() {
    let storage = Arc::new(MemoryStorage::new());
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, "image/jpeg".parse().unwrap());
    for i in 0..20 {
        storage
            .put(
                &format!("/img-{i}.jpg"),
                &headers,
                Bytes::from_static(b"body"),
            )
            .await;
    }

    let dispatcher = Arc::new(Dispatcher::new(coordinator_over(storage), 4));
    let mut tasks = Vec::new();
    for i in 0..20 {
        let dispatcher = Arc::clone(&dispatcher);
        tasks.push(tokio::spawn(async move {
            dispatcher
                .submit(
                    plain_get(&format!("/img-{i}.jpg")),
                    Deadline::after(Duration::from_secs(5)),
                )
                .await
                .status
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), 200);
    }
}
