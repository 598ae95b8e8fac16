// src/core/storage/mod.rs

//! Storage backends for originals and derived artifacts.
//!
//! Backends translate I/O failures into responses with a status code and an
//! attached error; a 404 is an ordinary response, not an error.

mod filesystem;
mod http_backend;
mod memory;

pub use filesystem::FilesystemStorage;
pub use http_backend::HttpStorage;
pub use memory::MemoryStorage;

use crate::core::errors::GatewayError;
use crate::core::response::Response;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http::HeaderMap;

/// Listing parameters, mirroring the S3 `ListObjects` query surface.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Bucket name echoed back in the listing document.
    pub bucket: String,
    pub prefix: String,
    pub delimiter: Option<String>,
    pub marker: String,
    pub max_keys: usize,
}

/// One object in a bucket listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    pub etag: String,
}

/// An S3-style bucket listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectListing {
    pub name: String,
    pub prefix: String,
    pub marker: String,
    pub max_keys: usize,
    pub is_truncated: bool,
    pub contents: Vec<ObjectInfo>,
    pub common_prefixes: Vec<String>,
}

/// A storage backend for one side (originals or derived) of a bucket.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, path: &str) -> Response;
    async fn head(&self, path: &str) -> Response;
    async fn put(&self, path: &str, headers: &HeaderMap, body: Bytes) -> Response;
    async fn delete(&self, path: &str) -> Response;
    async fn list(&self, opts: &ListOptions) -> Result<ObjectListing, GatewayError>;
}

/// Applies S3 listing semantics (marker, prefix, delimiter grouping and
/// max-keys truncation) to a sorted set of objects.
pub fn build_listing(mut objects: Vec<ObjectInfo>, opts: &ListOptions) -> ObjectListing {
    objects.sort_by(|a, b| a.key.cmp(&b.key));

    let mut listing = ObjectListing {
        name: opts.bucket.clone(),
        prefix: opts.prefix.clone(),
        marker: opts.marker.clone(),
        max_keys: opts.max_keys,
        ..Default::default()
    };

    let mut seen_prefixes: Vec<String> = Vec::new();
    for object in objects {
        if !object.key.starts_with(&opts.prefix) {
            continue;
        }
        if !opts.marker.is_empty() && object.key.as_str() <= opts.marker.as_str() {
            continue;
        }

        // Keys sharing a delimiter-bounded prefix are rolled up instead of
        // listed individually.
        if let Some(delimiter) = opts.delimiter.as_deref().filter(|d| !d.is_empty()) {
            let remainder = &object.key[opts.prefix.len()..];
            if let Some(cut) = remainder.find(delimiter) {
                let common = format!(
                    "{}{}{}",
                    opts.prefix,
                    &remainder[..cut],
                    delimiter
                );
                if !seen_prefixes.contains(&common) {
                    seen_prefixes.push(common);
                }
                continue;
            }
        }

        if listing.contents.len() + seen_prefixes.len() >= opts.max_keys.max(1) {
            listing.is_truncated = true;
            break;
        }
        listing.contents.push(object);
    }

    listing.common_prefixes = seen_prefixes;
    listing
}

impl ObjectListing {
    /// Renders the listing as an S3 `ListBucketResult` document.
    pub fn to_xml(&self) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">",
        );
        xml.push_str(&format!("<Name>{}</Name>", escape_xml(&self.name)));
        xml.push_str(&format!("<Prefix>{}</Prefix>", escape_xml(&self.prefix)));
        xml.push_str(&format!("<Marker>{}</Marker>", escape_xml(&self.marker)));
        xml.push_str(&format!("<MaxKeys>{}</MaxKeys>", self.max_keys));
        xml.push_str(&format!("<IsTruncated>{}</IsTruncated>", self.is_truncated));
        for object in &self.contents {
            xml.push_str("<Contents>");
            xml.push_str(&format!("<Key>{}</Key>", escape_xml(&object.key)));
            xml.push_str(&format!(
                "<LastModified>{}</LastModified>",
                object.last_modified.to_rfc3339_opts(SecondsFormat::Millis, true)
            ));
            xml.push_str(&format!("<ETag>{}</ETag>", escape_xml(&object.etag)));
            xml.push_str(&format!("<Size>{}</Size>", object.size));
            xml.push_str("<StorageClass>STANDARD</StorageClass>");
            xml.push_str("</Contents>");
        }
        for prefix in &self.common_prefixes {
            xml.push_str(&format!(
                "<CommonPrefixes><Prefix>{}</Prefix></CommonPrefixes>",
                escape_xml(prefix)
            ));
        }
        xml.push_str("</ListBucketResult>");
        xml
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Formats a timestamp for the HTTP `Last-Modified` header.
pub(crate) fn http_date(when: DateTime<Utc>) -> String {
    when.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
