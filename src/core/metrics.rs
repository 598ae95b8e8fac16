// src/core/metrics.rs

//! Defines and registers Prometheus metrics for gateway monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only
//! once globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    // --- Request counters ---
    /// Requests accepted by the dispatcher, labeled by HTTP method.
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "pixelgate_requests_total", "Total number of requests dispatched.", &["method"]).unwrap();
    /// Requests currently inside the coordination engine.
    pub static ref REQUESTS_IN_FLIGHT: Gauge =
        register_gauge!("pixelgate_requests_in_flight", "Number of requests currently being coordinated.").unwrap();
    /// Wall-clock time spent producing a response.
    pub static ref REQUEST_DURATION_SECONDS: Histogram = register_histogram!(
        "pixelgate_request_duration_seconds", "Request duration from dispatch to response.").unwrap();

    // --- Cache counters ---
    pub static ref CACHE_HITS_TOTAL: Counter =
        register_counter!("pixelgate_cache_hits_total", "Fresh response cache hits.").unwrap();
    /// Expired entries served because the caller permitted stale reads.
    pub static ref CACHE_STALE_HITS_TOTAL: Counter =
        register_counter!("pixelgate_cache_stale_hits_total", "Stale response cache hits.").unwrap();
    pub static ref CACHE_MISSES_TOTAL: Counter =
        register_counter!("pixelgate_cache_misses_total", "Response cache misses.").unwrap();
    /// Writes skipped because the response stream could not be cloned.
    pub static ref CACHE_UNCACHEABLE_TOTAL: Counter =
        register_counter!("pixelgate_cache_uncacheable_total", "Cache writes skipped for unclonable responses.").unwrap();

    // --- Coordination counters ---
    /// Waiters served by an owner's broadcast instead of computing themselves.
    pub static ref COLLAPSED_TOTAL: Counter =
        register_counter!("pixelgate_collapsed_total", "Requests collapsed into an in-flight computation.").unwrap();
    /// Waiters that timed out and fell back to their own computation.
    pub static ref COLLAPSE_FALLBACKS_TOTAL: Counter =
        register_counter!("pixelgate_collapse_fallbacks_total", "Single-flight waiters that recomputed independently.").unwrap();
    pub static ref THROTTLED_TOTAL: Counter =
        register_counter!("pixelgate_throttled_total", "Engine invocations rejected by the throttler.").unwrap();
    pub static ref ENGINE_FAILURES_TOTAL: Counter =
        register_counter!("pixelgate_engine_failures_total", "Engine invocations that returned an error.").unwrap();
    pub static ref PLACEHOLDER_RENDERS_TOTAL: Counter =
        register_counter!("pixelgate_placeholder_renders_total", "Placeholder images rendered through a transform chain.").unwrap();

    // --- Writeback counters ---
    pub static ref WRITEBACKS_TOTAL: Counter =
        register_counter!("pixelgate_writebacks_total", "Processed images persisted back to storage.").unwrap();
    pub static ref WRITEBACK_FAILURES_TOTAL: Counter =
        register_counter!("pixelgate_writeback_failures_total", "Storage writebacks that failed or timed out.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text
/// format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
