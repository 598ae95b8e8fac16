// src/core/coordinator/mod.rs

//! Orchestrates cache, single-flight, parent resolution, throttled
//! processing and storage writeback for every request.

mod placeholder;

pub use placeholder::PlaceholderSource;

use crate::core::cache::ResponseCache;
use crate::core::deadline::Deadline;
use crate::core::engine::ImageEngine;
use crate::core::errors::GatewayError;
use crate::core::flight::{Flight, SingleFlight};
use crate::core::metrics;
use crate::core::object::{ImageObject, Transform};
use crate::core::resolver;
use crate::core::response::Response;
use crate::core::storage::{ListOptions, Storage};
use crate::core::throttle::Throttler;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, header};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How often a single-flight waiter probes the cache while waiting for the
/// owner's broadcast.
const WAITER_PROBE_INTERVAL: Duration = Duration::from_millis(25);

/// The storage pair serving one bucket.
#[derive(Clone)]
pub struct BucketStorages {
    /// Originals.
    pub basic: Arc<dyn Storage>,
    /// Derived artifacts. Often the same backend as `basic`.
    pub transforms: Arc<dyn Storage>,
}

/// Tunables for the coordination engine.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub cache_max_entries: usize,
    pub concurrency: usize,
    /// How long a waiter trusts an in-flight owner before recomputing.
    pub lock_timeout: Duration,
    pub success_ttl: Duration,
    pub placeholder_ttl: Duration,
    pub error_ttl: Duration,
    pub writeback_timeout: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            cache_max_entries: 1024,
            concurrency: 4,
            lock_timeout: Duration::from_secs(9),
            success_ttl: Duration::from_secs(120),
            placeholder_ttl: Duration::from_secs(600),
            error_ttl: Duration::from_secs(60),
            writeback_timeout: Duration::from_secs(30),
        }
    }
}

/// A request as seen by the coordinator, after URL parsing.
#[derive(Debug)]
pub struct GatewayRequest {
    pub method: Method,
    pub object: ImageObject,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Listing parameters when the request targets a bucket root.
    pub list: Option<ListQuery>,
}

/// Listing parameters from an S3-style query string.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub prefix: String,
    pub delimiter: Option<String>,
    pub marker: String,
    pub max_keys: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            delimiter: None,
            marker: String::new(),
            max_keys: 1000,
        }
    }
}

enum WaiterOutcome {
    Cancelled,
    Received(Option<Response>),
    TimedOut,
    Probed,
}

/// The request coordination engine.
pub struct Coordinator {
    buckets: HashMap<String, BucketStorages>,
    cache: Arc<ResponseCache>,
    flight: Arc<SingleFlight>,
    throttler: Throttler,
    engine: Arc<dyn ImageEngine>,
    placeholder: Option<PlaceholderSource>,
    settings: CoordinatorSettings,
}

impl Coordinator {
    pub fn new(
        buckets: HashMap<String, BucketStorages>,
        engine: Arc<dyn ImageEngine>,
        placeholder: Option<PlaceholderSource>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            buckets,
            cache: Arc::new(ResponseCache::new(settings.cache_max_entries)),
            flight: Arc::new(SingleFlight::new()),
            throttler: Throttler::new(settings.concurrency),
            engine,
            placeholder,
            settings,
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn flight(&self) -> &Arc<SingleFlight> {
        &self.flight
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Entry point for one request. Always yields a response; failures are
    /// responses with an attached error.
    pub async fn dispatch(
        &self,
        request: GatewayRequest,
        deadline: Deadline,
        cancel: &CancellationToken,
    ) -> Response {
        metrics::REQUESTS_TOTAL
            .with_label_values(&[request.method.as_str()])
            .inc();
        metrics::REQUESTS_IN_FLIGHT.inc();
        let timer = metrics::REQUEST_DURATION_SECONDS.start_timer();

        let response = self.route(request, deadline, cancel).await;

        timer.observe_duration();
        metrics::REQUESTS_IN_FLIGHT.dec();
        response
    }

    async fn route(
        &self,
        request: GatewayRequest,
        deadline: Deadline,
        cancel: &CancellationToken,
    ) -> Response {
        let Some(storages) = self.buckets.get(&request.object.bucket) else {
            return Response::from_error(GatewayError::BucketNotFound(
                request.object.bucket.clone(),
            ));
        };

        if request.method == Method::GET || request.method == Method::HEAD {
            if request.object.is_bucket_root() {
                return self.handle_list(storages, &request).await;
            }
            if request.object.has_transforms() {
                self.collapsed_get(storages, &request.object, deadline, cancel)
                    .await
            } else {
                self.handle_get(storages, &request.object, deadline, cancel)
                    .await
            }
        } else if request.method == Method::PUT {
            self.handle_put(storages, &request).await
        } else if request.method == Method::DELETE {
            self.handle_delete(storages, &request.object).await
        } else {
            Response::from_error(GatewayError::MethodNotAllowed)
        }
    }

    /// GET with single-flight collapse: the first request for a key computes,
    /// concurrent duplicates wait for its broadcast.
    async fn collapsed_get(
        &self,
        storages: &BucketStorages,
        object: &ImageObject,
        deadline: Deadline,
        cancel: &CancellationToken,
    ) -> Response {
        match self.flight.acquire(&object.key) {
            Flight::Owner(guard) => {
                let response = self.handle_get(storages, object, deadline, cancel).await;
                // An unclonable response closes the waiter channels instead;
                // waiters recompute on their own.
                guard.publish(&response);
                response
            }
            Flight::Waiter(mut ticket) => {
                debug!("Collapsing request for '{}' into in-flight owner", object.key);
                let lock_deadline = tokio::time::Instant::now()
                    + self.settings.lock_timeout.min(deadline.remaining());
                let mut probe = tokio::time::interval(WAITER_PROBE_INTERVAL);
                probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    let outcome = tokio::select! {
                        _ = cancel.cancelled() => WaiterOutcome::Cancelled,
                        received = ticket.recv() => WaiterOutcome::Received(received),
                        _ = tokio::time::sleep_until(lock_deadline) => WaiterOutcome::TimedOut,
                        _ = probe.tick() => WaiterOutcome::Probed,
                    };
                    match outcome {
                        WaiterOutcome::Cancelled => {
                            ticket.cancel();
                            return Response::from_error(GatewayError::ClientCancelled);
                        }
                        WaiterOutcome::Received(Some(response)) => {
                            metrics::COLLAPSED_TOTAL.inc();
                            return response;
                        }
                        WaiterOutcome::Received(None) => {
                            // Owner released without a result.
                            metrics::COLLAPSE_FALLBACKS_TOTAL.inc();
                            return self.handle_get(storages, object, deadline, cancel).await;
                        }
                        WaiterOutcome::TimedOut => {
                            ticket.cancel();
                            metrics::COLLAPSE_FALLBACKS_TOTAL.inc();
                            return self.handle_get(storages, object, deadline, cancel).await;
                        }
                        WaiterOutcome::Probed => {
                            // The owner may have populated the cache even if
                            // our broadcast got lost; stale is acceptable here.
                            if let Some(hit) = self.cache.get(&object.key, true) {
                                ticket.cancel();
                                metrics::COLLAPSED_TOTAL.inc();
                                return hit;
                            }
                        }
                    }
                }
            }
        }
    }

    /// The uncollapsed GET path: cache, then storage, then processing.
    async fn handle_get(
        &self,
        storages: &BucketStorages,
        object: &ImageObject,
        deadline: Deadline,
        cancel: &CancellationToken,
    ) -> Response {
        if let Some(hit) = self.cache.get(&object.key, false) {
            return hit;
        }
        metrics::CACHE_MISSES_TOTAL.inc();

        let (root, transform_stack) = match resolver::resolve(object) {
            Ok(resolved) => resolved,
            Err(e) => return Response::from_error(e),
        };

        // Derived GET and root HEAD run in parallel, bounded by the deadline.
        let derived_storage = if object.has_transforms() {
            &storages.transforms
        } else {
            &storages.basic
        };
        let need_head = object.check_parent && object.has_parent();
        let io = async {
            if need_head {
                let (get, head) = tokio::join!(
                    derived_storage.get(&object.path),
                    storages.basic.head(&root.path)
                );
                (get, Some(head))
            } else {
                (derived_storage.get(&object.path).await, None)
            }
        };
        let (get_response, mut head_response) = tokio::select! {
            result = io => result,
            _ = cancel.cancelled() => {
                return Response::from_error(GatewayError::ClientCancelled);
            }
            _ = tokio::time::sleep_until(deadline.instant()) => {
                return self
                    .reply_with_error(object, 504, GatewayError::Timeout, deadline, cancel)
                    .await;
            }
        };

        match get_response.status {
            200..=299 => match head_response {
                Some(head) if head.status != 200 => {
                    self.surface_parent_failure(object, head, deadline, cancel).await
                }
                _ => get_response,
            },
            404 => {
                self.not_found_path(
                    storages,
                    object,
                    &root,
                    transform_stack,
                    head_response.take(),
                    deadline,
                    cancel,
                )
                .await
            }
            status if status >= 500 => {
                let error = GatewayError::UpstreamError {
                    status,
                    message: "storage error on derived object".to_string(),
                };
                self.reply_with_error(object, status, error, deadline, cancel)
                    .await
            }
            // 304 and other non-error statuses pass through untouched.
            _ => get_response,
        }
    }

    /// The derived artifact is missing; decide between 404 and a fresh
    /// engine pass from the chain root.
    #[allow(clippy::too_many_arguments)]
    async fn not_found_path(
        &self,
        storages: &BucketStorages,
        object: &ImageObject,
        root: &ImageObject,
        transform_stack: Vec<Transform>,
        earlier_head: Option<Response>,
        deadline: Deadline,
        cancel: &CancellationToken,
    ) -> Response {
        let head = match earlier_head {
            Some(head) => head,
            None => {
                if cancel.is_cancelled() {
                    return Response::from_error(GatewayError::ClientCancelled);
                }
                match resolver::head_root(&storages.basic, root, deadline).await {
                    Ok(head) => head,
                    Err(e) => {
                        return self
                            .reply_with_error(object, e.status_code(), e, deadline, cancel)
                            .await;
                    }
                }
            }
        };

        match head.status {
            404 => self.cached_not_found(object),
            200 => {
                if !object.has_transforms() {
                    // The object itself is the root; GET and HEAD disagreed,
                    // which reads as a deletion race. Surface the miss.
                    return self.cached_not_found(object);
                }
                if !head.is_image() {
                    let error = GatewayError::TransformFailure(format!(
                        "root object '{}' is not an image",
                        root.path
                    ));
                    return self
                        .reply_with_error(object, 400, error, deadline, cancel)
                        .await;
                }
                let root_response = match resolver::fetch_root(&storages.basic, root, deadline)
                    .await
                {
                    Ok(response) => response,
                    Err(e) => {
                        return self
                            .reply_with_error(object, e.status_code(), e, deadline, cancel)
                            .await;
                    }
                };
                match root_response.status {
                    200..=299 => {
                        self.process_image(
                            storages,
                            object,
                            root_response,
                            &transform_stack,
                            deadline,
                            cancel,
                        )
                        .await
                    }
                    404 => self.cached_not_found(object),
                    status if status >= 500 => {
                        let error = GatewayError::UpstreamError {
                            status,
                            message: "storage error on chain root".to_string(),
                        };
                        self.reply_with_error(object, status, error, deadline, cancel)
                            .await
                    }
                    _ => root_response,
                }
            }
            status => {
                let head_error = GatewayError::UpstreamError {
                    status,
                    message: "parent HEAD failed".to_string(),
                };
                self.reply_with_error(object, status, head_error, deadline, cancel)
                    .await
            }
        }
    }

    /// Throttled engine pass over the root bytes, then cache + writeback.
    async fn process_image(
        &self,
        storages: &BucketStorages,
        object: &ImageObject,
        root_response: Response,
        transform_stack: &[Transform],
        deadline: Deadline,
        cancel: &CancellationToken,
    ) -> Response {
        let Some(permit) = self.throttler.acquire(deadline).await else {
            metrics::THROTTLED_TOTAL.inc();
            return self
                .reply_with_error(object, 503, GatewayError::Throttled, deadline, cancel)
                .await;
        };
        let result = self
            .engine
            .process(root_response, transform_stack, deadline)
            .await;
        drop(permit);

        match result {
            Ok(response) => {
                match response.try_clone() {
                    Ok(writeback_copy) => {
                        self.cache
                            .set(&object.key, &response, self.settings.success_ttl);
                        self.spawn_writeback(
                            Arc::clone(&storages.transforms),
                            object.path.clone(),
                            writeback_copy,
                        );
                    }
                    Err(_) => {
                        // Drained stream: the caller still gets the result,
                        // it is just neither cached nor persisted.
                        debug!("Engine result for '{}' is not clonable; skipping cache and writeback", object.key);
                    }
                }
                response
            }
            Err(e) => {
                metrics::ENGINE_FAILURES_TOTAL.inc();
                self.reply_with_error(object, e.status_code(), e, deadline, cancel)
                    .await
            }
        }
    }

    /// Persists a processed image in the background. The client response
    /// never waits on this, and the task carries its own deadline so client
    /// disconnects cannot cancel it.
    fn spawn_writeback(&self, storage: Arc<dyn Storage>, path: String, copy: Response) {
        let budget = self.settings.writeback_timeout;
        tokio::spawn(async move {
            let headers = copy.headers.clone();
            let body = match copy.into_body_bytes().await {
                Ok(body) => body,
                Err(_) => return,
            };
            match tokio::time::timeout(budget, storage.put(&path, &headers, body)).await {
                Ok(response) if response.is_success() => {
                    metrics::WRITEBACKS_TOTAL.inc();
                    debug!("Wrote back processed image to '{path}'");
                }
                Ok(response) => {
                    metrics::WRITEBACK_FAILURES_TOTAL.inc();
                    warn!("Writeback to '{path}' failed with status {}", response.status);
                }
                Err(_) => {
                    metrics::WRITEBACK_FAILURES_TOTAL.inc();
                    warn!("Writeback to '{path}' timed out after {budget:?}");
                }
            }
        });
    }

    /// A parent HEAD that gated a direct hit came back non-200.
    async fn surface_parent_failure(
        &self,
        object: &ImageObject,
        head: Response,
        deadline: Deadline,
        cancel: &CancellationToken,
    ) -> Response {
        if head.status == 404 {
            return self.cached_not_found(object);
        }
        let error = GatewayError::UpstreamError {
            status: head.status,
            message: "parent HEAD failed".to_string(),
        };
        self.reply_with_error(object, head.status, error, deadline, cancel)
            .await
    }

    /// A 404 for a missing root, cached briefly so storms of misses for the
    /// same missing original don't hammer storage.
    fn cached_not_found(&self, object: &ImageObject) -> Response {
        let response = Response::from_error(GatewayError::UpstreamNotFound);
        self.cache.set(&object.key, &response, self.settings.error_ttl);
        response
    }

    async fn handle_put(&self, storages: &BucketStorages, request: &GatewayRequest) -> Response {
        let object = &request.object;
        let response = storages
            .basic
            .put(&object.path, &request.headers, request.body.clone())
            .await;
        self.cache.invalidate(&object.key);
        response
    }

    async fn handle_delete(&self, storages: &BucketStorages, object: &ImageObject) -> Response {
        let storage = if object.has_transforms() {
            &storages.transforms
        } else {
            &storages.basic
        };
        let response = storage.delete(&object.path).await;
        self.cache.invalidate(&object.key);
        response
    }

    async fn handle_list(&self, storages: &BucketStorages, request: &GatewayRequest) -> Response {
        if request.method != Method::GET {
            return Response::from_error(GatewayError::MethodNotAllowed);
        }
        let query = request.list.clone().unwrap_or_default();
        let opts = ListOptions {
            bucket: request.object.bucket.clone(),
            prefix: query.prefix,
            delimiter: query.delimiter,
            marker: query.marker,
            max_keys: query.max_keys,
        };
        match storages.basic.list(&opts).await {
            Ok(listing) => {
                let mut response = Response::buffered(200, Bytes::from(listing.to_xml()));
                response.headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/xml"),
                );
                response
            }
            Err(e) => Response::from_error(e),
        }
    }
}
