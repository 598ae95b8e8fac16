// src/core/coordinator/placeholder.rs

//! Error-placeholder recovery: a configured fallback image rendered through
//! the requested transform chain, shared across originals via the chain
//! fingerprint.

use super::{Coordinator, WaiterOutcome};
use crate::core::deadline::Deadline;
use crate::core::errors::GatewayError;
use crate::core::flight::Flight;
use crate::core::metrics;
use crate::core::object::ImageObject;
use crate::core::response::Response;
use anyhow::Context;
use bytes::Bytes;
use std::path::Path;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Poll backoff for waiters on an in-flight placeholder render.
const PLACEHOLDER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The configured fallback image.
#[derive(Debug, Clone)]
pub struct PlaceholderSource {
    /// Identifier mixed into placeholder cache keys.
    pub id: String,
    pub bytes: Bytes,
    pub content_type: String,
}

impl PlaceholderSource {
    pub fn new(id: &str, bytes: Bytes, content_type: &str) -> Self {
        Self {
            id: id.to_string(),
            bytes,
            content_type: content_type.to_string(),
        }
    }

    /// Loads the placeholder image from disk at startup.
    pub fn from_file(id: &str, path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read placeholder image at '{}'", path.display()))?;
        let content_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream");
        Ok(Self::new(id, Bytes::from(bytes), content_type))
    }
}

impl Coordinator {
    /// Converts a failure into a response, attempting the placeholder path
    /// when the error kind and the request allow it.
    pub(super) async fn reply_with_error(
        &self,
        object: &ImageObject,
        status: u16,
        error: GatewayError,
        _deadline: Deadline,
        cancel: &CancellationToken,
    ) -> Response {
        let Some(source) = &self.placeholder else {
            return Response::from_error_with_status(status, error);
        };
        if object.transforms.is_empty() || object.debug || !error.wants_placeholder() {
            return Response::from_error_with_status(status, error);
        }

        // The request deadline has often already burned out by the time we
        // get here (timeouts, throttling). The render runs under its own
        // bounded budget so the placeholder still lands in the cache for
        // this and subsequent failures.
        let render_deadline = Deadline::after(self.settings.lock_timeout);

        // Identical chains on different originals share one rendered
        // placeholder, keyed by the chain fingerprint.
        let placeholder_key = format!("{}:{}", source.id, object.transforms.fingerprint_hex());

        if let Some(hit) = self.cache.get(&placeholder_key, true) {
            return stamp(hit, status, error);
        }

        match self.flight.acquire(&placeholder_key) {
            Flight::Owner(guard) => {
                let input = Response::buffered(200, source.bytes.clone())
                    .with_content_type(&source.content_type);
                match self
                    .engine
                    .process(input, object.transforms.as_slice(), render_deadline)
                    .await
                {
                    Ok(rendered) => {
                        metrics::PLACEHOLDER_RENDERS_TOTAL.inc();
                        self.cache
                            .set(&placeholder_key, &rendered, self.settings.placeholder_ttl);
                        guard.publish(&rendered);
                        stamp(rendered, status, error)
                    }
                    Err(render_error) => {
                        debug!(
                            "Placeholder render for '{placeholder_key}' failed: {render_error}"
                        );
                        // Dropping the guard releases the key; waiters fall
                        // back to plain error responses.
                        drop(guard);
                        Response::from_error_with_status(status, error)
                    }
                }
            }
            Flight::Waiter(mut ticket) => {
                let poll_deadline = tokio::time::Instant::now() + self.settings.lock_timeout;
                let mut poll = tokio::time::interval(PLACEHOLDER_POLL_INTERVAL);
                poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    let outcome = tokio::select! {
                        _ = cancel.cancelled() => WaiterOutcome::Cancelled,
                        received = ticket.recv() => WaiterOutcome::Received(received),
                        _ = tokio::time::sleep_until(poll_deadline) => WaiterOutcome::TimedOut,
                        _ = poll.tick() => WaiterOutcome::Probed,
                    };
                    match outcome {
                        WaiterOutcome::Cancelled => {
                            ticket.cancel();
                            return Response::from_error(GatewayError::ClientCancelled);
                        }
                        WaiterOutcome::Received(Some(rendered)) => {
                            return stamp(rendered, status, error);
                        }
                        WaiterOutcome::Received(None) => {
                            return Response::from_error_with_status(status, error);
                        }
                        WaiterOutcome::TimedOut => {
                            ticket.cancel();
                            return Response::from_error_with_status(status, error);
                        }
                        WaiterOutcome::Probed => {
                            if let Some(hit) = self.cache.get(&placeholder_key, true) {
                                ticket.cancel();
                                return stamp(hit, status, error);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Overrides the rendered placeholder's status with the original failure.
fn stamp(mut rendered: Response, status: u16, error: GatewayError) -> Response {
    rendered.status = status;
    rendered.error = Some(error);
    rendered
}
