// src/core/storage/http_backend.rs

//! Read-only HTTP storage backend proxying a remote origin.

use crate::core::errors::GatewayError;
use crate::core::response::Response;
use crate::core::storage::{ListOptions, ObjectListing, Storage};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use http::{HeaderMap, header};
use url::Url;

/// Headers forwarded from the origin response.
const FORWARDED_HEADERS: [header::HeaderName; 5] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::ETAG,
    header::LAST_MODIFIED,
    header::CACHE_CONTROL,
];

/// Proxies GET/HEAD to a remote HTTP origin. Writes are rejected.
pub struct HttpStorage {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpStorage {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn forward(origin: reqwest::Response) -> Response {
        let status = origin.status().as_u16();
        let mut headers = HeaderMap::new();
        for name in FORWARDED_HEADERS {
            if let Some(value) = origin.headers().get(&name) {
                headers.insert(name, value.clone());
            }
        }
        let stream = origin.bytes_stream().map_err(std::io::Error::other);
        let mut response = Response::from_stream(status, headers, Box::pin(stream));
        if status >= 500 {
            response.error = Some(GatewayError::UpstreamError {
                status,
                message: "origin error".to_string(),
            });
        }
        response
    }
}

#[async_trait]
impl Storage for HttpStorage {
    async fn get(&self, path: &str) -> Response {
        match self.client.get(self.object_url(path)).send().await {
            Ok(origin) => Self::forward(origin),
            Err(e) => Response::from_error(e.into()),
        }
    }

    async fn head(&self, path: &str) -> Response {
        match self.client.head(self.object_url(path)).send().await {
            Ok(origin) => Self::forward(origin),
            Err(e) => Response::from_error(e.into()),
        }
    }

    async fn put(&self, _path: &str, _headers: &HeaderMap, _body: Bytes) -> Response {
        Response::from_error(GatewayError::MethodNotAllowed)
    }

    async fn delete(&self, _path: &str) -> Response {
        Response::from_error(GatewayError::MethodNotAllowed)
    }

    async fn list(&self, opts: &ListOptions) -> Result<ObjectListing, GatewayError> {
        // The origin exposes no enumeration API; an empty listing is the
        // honest answer.
        Ok(ObjectListing {
            name: opts.bucket.clone(),
            prefix: opts.prefix.clone(),
            marker: opts.marker.clone(),
            max_keys: opts.max_keys,
            ..Default::default()
        })
    }
}
