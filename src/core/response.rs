// src/core/response.rs

//! The gateway's internal HTTP response value with clone-on-read semantics.

use crate::core::errors::GatewayError;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use http::{HeaderMap, HeaderValue, header};
use std::fmt;
use std::pin::Pin;

/// A one-shot byte stream backing a non-buffered response body.
pub type BytesStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static>>;

/// A response body: either a finite in-memory buffer (cloneable freely) or a
/// stream that is consumed exactly once (then not cloneable).
pub enum Body {
    Buffered(Bytes),
    Stream(BytesStream),
}

/// A response flowing through the coordination engine.
///
/// Non-2xx responses carry the error that produced them, so failures travel
/// as values all the way to the dispatcher.
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub error: Option<GatewayError>,
    body: Body,
}

impl Response {
    /// A response over an in-memory buffer.
    pub fn buffered(status: u16, body: Bytes) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            error: None,
            body: Body::Buffered(body),
        }
    }

    /// A bodyless response.
    pub fn empty(status: u16) -> Self {
        Self::buffered(status, Bytes::new())
    }

    /// A response over a one-shot stream.
    pub fn from_stream(status: u16, headers: HeaderMap, stream: BytesStream) -> Self {
        Self {
            status,
            headers,
            error: None,
            body: Body::Stream(stream),
        }
    }

    /// A plain error response: status from the error kind, message as body.
    pub fn from_error(error: GatewayError) -> Self {
        Self::from_error_with_status(error.status_code(), error)
    }

    /// A plain error response with an explicit status override.
    pub fn from_error_with_status(status: u16, error: GatewayError) -> Self {
        let mut response = Self::buffered(status, Bytes::from(error.to_string()));
        response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response.error = Some(error);
        response
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            self.headers.insert(header::CONTENT_TYPE, value);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Whether the payload is an image, judged by content type. An absent
    /// content type is treated as unknown, not as an image.
    pub fn is_image(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.trim_start().starts_with("image/"))
    }

    pub fn etag(&self) -> Option<&str> {
        self.headers
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
    }

    /// The body length, from the buffer itself or the Content-Length header
    /// for streams.
    pub fn content_length(&self) -> Option<u64> {
        match &self.body {
            Body::Buffered(bytes) => Some(bytes.len() as u64),
            Body::Stream(_) => self
                .headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok()),
        }
    }

    pub fn is_cloneable(&self) -> bool {
        matches!(self.body, Body::Buffered(_))
    }

    /// Produces an independent response over the same underlying buffer.
    ///
    /// Streams cannot be cloned; the caller decides whether to buffer first.
    pub fn try_clone(&self) -> Result<Response, GatewayError> {
        match &self.body {
            Body::Buffered(bytes) => Ok(Response {
                status: self.status,
                headers: self.headers.clone(),
                error: self.error.clone(),
                body: Body::Buffered(bytes.clone()),
            }),
            Body::Stream(_) => Err(GatewayError::StreamConsumed),
        }
    }

    /// Converts a streamed body into a buffered one, consuming the stream.
    /// Buffered responses pass through unchanged.
    pub async fn into_buffered(self) -> Result<Response, GatewayError> {
        match self.body {
            Body::Buffered(_) => Ok(self),
            Body::Stream(mut stream) => {
                let mut collected = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    collected.extend_from_slice(&chunk?);
                }
                Ok(Response {
                    status: self.status,
                    headers: self.headers,
                    error: self.error,
                    body: Body::Buffered(collected.freeze()),
                })
            }
        }
    }

    /// Consumes the response and yields its body bytes.
    pub async fn into_body_bytes(self) -> Result<Bytes, GatewayError> {
        let buffered = self.into_buffered().await?;
        match buffered.body {
            Body::Buffered(bytes) => Ok(bytes),
            Body::Stream(_) => unreachable!("into_buffered always yields a buffer"),
        }
    }

    /// Takes the body out of the response for handing to an HTTP framework.
    pub fn into_parts(self) -> (u16, HeaderMap, Option<GatewayError>, Body) {
        (self.status, self.headers, self.error, self.body)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("error", &self.error)
            .field(
                "body",
                &match &self.body {
                    Body::Buffered(bytes) => format!("Buffered({} bytes)", bytes.len()),
                    Body::Stream(_) => "Stream".to_string(),
                },
            )
            .finish()
    }
}
