// src/core/storage/filesystem.rs

//! Local-filesystem storage backend.

use crate::core::errors::GatewayError;
use crate::core::response::Response;
use crate::core::storage::{
    ListOptions, ObjectInfo, ObjectListing, Storage, build_listing, http_date,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderValue, header};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

/// Stores objects as plain files under a root directory.
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Maps an object path onto the root directory, rejecting traversal.
    fn resolve(&self, path: &str) -> Result<PathBuf, GatewayError> {
        let relative = path.trim_start_matches('/');
        let candidate = Path::new(relative);
        if relative.is_empty()
            || candidate
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(GatewayError::InvalidRequest(format!(
                "invalid object path '{path}'"
            )));
        }
        Ok(self.root.join(candidate))
    }

    fn object_headers(file_path: &Path, len: u64, modified: SystemTime) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let content_type = mime_guess::from_path(file_path)
            .first_raw()
            .unwrap_or("application/octet-stream");
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        let mtime_secs = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if let Ok(etag) = HeaderValue::from_str(&format!("\"{len:x}-{mtime_secs:x}\"")) {
            headers.insert(header::ETAG, etag);
        }
        if let Ok(value) = HeaderValue::from_str(&http_date(DateTime::<Utc>::from(modified))) {
            headers.insert(header::LAST_MODIFIED, value);
        }
        headers
    }
}

#[async_trait]
impl Storage for FilesystemStorage {
    async fn get(&self, path: &str) -> Response {
        let file_path = match self.resolve(path) {
            Ok(p) => p,
            Err(e) => return Response::from_error(e),
        };
        let metadata = match tokio::fs::metadata(&file_path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Response::empty(404),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Response::empty(404),
            Err(e) => return Response::from_error(e.into()),
        };
        match tokio::fs::read(&file_path).await {
            Ok(body) => {
                let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
                let mut response = Response::buffered(200, Bytes::from(body));
                response.headers = Self::object_headers(&file_path, metadata.len(), modified);
                response
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Response::empty(404),
            Err(e) => Response::from_error(e.into()),
        }
    }

    async fn head(&self, path: &str) -> Response {
        let file_path = match self.resolve(path) {
            Ok(p) => p,
            Err(e) => return Response::from_error(e),
        };
        match tokio::fs::metadata(&file_path).await {
            Ok(metadata) if metadata.is_file() => {
                let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
                let mut response = Response::empty(200);
                response.headers = Self::object_headers(&file_path, metadata.len(), modified);
                response
                    .headers
                    .insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
                response
            }
            Ok(_) => Response::empty(404),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Response::empty(404),
            Err(e) => Response::from_error(e.into()),
        }
    }

    async fn put(&self, path: &str, _headers: &HeaderMap, body: Bytes) -> Response {
        let file_path = match self.resolve(path) {
            Ok(p) => p,
            Err(e) => return Response::from_error(e),
        };
        if let Some(parent) = file_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Response::from_error(e.into());
            }
        }
        // Write-then-rename keeps concurrent readers from ever observing a
        // partially written object.
        let temp_path = self.root.join(format!(".tmp-{}", Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&temp_path, &body).await {
            return Response::from_error(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &file_path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
                warn!("Failed to remove temp file after rename error: {cleanup}");
            }
            return Response::from_error(e.into());
        }
        Response::empty(200)
    }

    async fn delete(&self, path: &str) -> Response {
        let file_path = match self.resolve(path) {
            Ok(p) => p,
            Err(e) => return Response::from_error(e),
        };
        match tokio::fs::remove_file(&file_path).await {
            Ok(()) => Response::empty(200),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Response::empty(404),
            Err(e) => Response::from_error(e.into()),
        }
    }

    async fn list(&self, opts: &ListOptions) -> Result<ObjectListing, GatewayError> {
        let mut objects = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path();
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    pending.push(entry_path);
                    continue;
                }
                let Ok(relative) = entry_path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative.to_string_lossy().replace('\\', "/");
                if key.starts_with(".tmp-") {
                    continue;
                }
                let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
                let mtime_secs = modified
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                objects.push(ObjectInfo {
                    key,
                    last_modified: DateTime::<Utc>::from(modified),
                    size: metadata.len(),
                    etag: format!("\"{:x}-{:x}\"", metadata.len(), mtime_secs),
                });
            }
        }

        Ok(build_listing(objects, opts))
    }
}
