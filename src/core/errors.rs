// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the
/// gateway. Variants map onto the HTTP statuses the gateway emits; errors
/// travel as values attached to responses, never as panics.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// The client abandoned the request (or its deadline fired in the
    /// dispatcher before a worker produced a response).
    #[error("Client cancelled the request")]
    ClientCancelled,

    /// A local deadline elapsed while waiting on storage or the engine.
    #[error("Deadline exceeded")]
    Timeout,

    /// No processing permit became available within the deadline.
    #[error("Processing throttled")]
    Throttled,

    /// The root of the parent chain does not exist on storage.
    #[error("Upstream object not found")]
    UpstreamNotFound,

    /// Storage answered with an unexpected status.
    #[error("Upstream error ({status}): {message}")]
    UpstreamError { status: u16, message: String },

    /// The engine rejected the input or the transform chain.
    #[error("Transform failure: {0}")]
    TransformFailure(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    /// A response body stream was already consumed and cannot be cloned.
    #[error("Response stream already consumed")]
    StreamConsumed,

    #[error("Unknown bucket '{0}'")]
    BucketNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The HTTP status code this error surfaces as.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::ClientCancelled => 499,
            GatewayError::Timeout => 504,
            GatewayError::Throttled => 503,
            GatewayError::UpstreamNotFound | GatewayError::BucketNotFound(_) => 404,
            GatewayError::UpstreamError { status, .. } => *status,
            GatewayError::TransformFailure(_) | GatewayError::InvalidRequest(_) => 400,
            GatewayError::MethodNotAllowed => 405,
            GatewayError::StreamConsumed
            | GatewayError::Io(_)
            | GatewayError::HttpClient(_)
            | GatewayError::Internal(_) => 500,
        }
    }

    /// Whether the placeholder recovery path should run for this error.
    /// Matches the failure table: timeouts, throttling, upstream 5xx and
    /// transform failures get a placeholder; 404s and client aborts do not.
    pub fn wants_placeholder(&self) -> bool {
        match self {
            GatewayError::Timeout
            | GatewayError::Throttled
            | GatewayError::TransformFailure(_)
            | GatewayError::HttpClient(_)
            | GatewayError::Io(_)
            | GatewayError::Internal(_) => true,
            GatewayError::UpstreamError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Io(Arc::new(e))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::HttpClient(e.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Internal(format!("JSON serialization/deserialization error: {e}"))
    }
}
