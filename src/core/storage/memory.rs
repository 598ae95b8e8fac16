// src/core/storage/memory.rs

//! In-memory storage backend, used by tests and placeholder-style buckets.

use crate::core::errors::GatewayError;
use crate::core::response::Response;
use crate::core::storage::{
    ListOptions, ObjectInfo, ObjectListing, Storage, build_listing, http_date,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use http::{HeaderMap, HeaderValue, header};
use std::io::Cursor;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    content_type: String,
    etag: String,
    last_modified: DateTime<Utc>,
}

/// Keeps whole objects in a concurrent map.
#[derive(Default)]
pub struct MemoryStorage {
    objects: DashMap<String, StoredObject>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(path: &str) -> String {
        path.trim_start_matches('/').to_string()
    }

    fn object_headers(object: &StoredObject) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&object.content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&object.etag) {
            headers.insert(header::ETAG, value);
        }
        if let Ok(value) = HeaderValue::from_str(&http_date(object.last_modified)) {
            headers.insert(header::LAST_MODIFIED, value);
        }
        headers
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, path: &str) -> Response {
        match self.objects.get(&Self::normalize(path)) {
            Some(object) => {
                let mut response = Response::buffered(200, object.body.clone());
                response.headers = Self::object_headers(&object);
                response
            }
            None => Response::empty(404),
        }
    }

    async fn head(&self, path: &str) -> Response {
        match self.objects.get(&Self::normalize(path)) {
            Some(object) => {
                let mut response = Response::empty(200);
                response.headers = Self::object_headers(&object);
                response.headers.insert(
                    header::CONTENT_LENGTH,
                    HeaderValue::from(object.body.len() as u64),
                );
                response
            }
            None => Response::empty(404),
        }
    }

    async fn put(&self, path: &str, headers: &HeaderMap, body: Bytes) -> Response {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| {
                mime_guess::from_path(path)
                    .first_raw()
                    .unwrap_or("application/octet-stream")
                    .to_string()
            });
        let fingerprint =
            murmur3::murmur3_x64_128(&mut Cursor::new(&body), 0).unwrap_or_default() as u64;
        self.objects.insert(
            Self::normalize(path),
            StoredObject {
                body,
                content_type,
                etag: format!("\"{fingerprint:016x}\""),
                last_modified: Utc::now(),
            },
        );
        Response::empty(200)
    }

    async fn delete(&self, path: &str) -> Response {
        match self.objects.remove(&Self::normalize(path)) {
            Some(_) => Response::empty(200),
            None => Response::empty(404),
        }
    }

    async fn list(&self, opts: &ListOptions) -> Result<ObjectListing, GatewayError> {
        let objects = self
            .objects
            .iter()
            .map(|entry| ObjectInfo {
                key: entry.key().clone(),
                last_modified: entry.value().last_modified,
                size: entry.value().body.len() as u64,
                etag: entry.value().etag.clone(),
            })
            .collect();
        Ok(build_listing(objects, opts))
    }
}
