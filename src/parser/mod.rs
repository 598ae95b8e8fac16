// src/parser/mod.rs

//! Maps HTTP requests onto image objects and their parent chains.

mod preset;
mod query;

use crate::config::{Config, TransformStrategy};
use crate::core::errors::GatewayError;
use crate::core::object::ImageObject;
use http::Method;

/// Parses a request path and query string into an `ImageObject`.
///
/// The first path segment selects the bucket. Transform recognition depends
/// on the bucket's strategy; a request with no recognized transform parses
/// to a plain object. Only GET and HEAD requests carry transforms — writes
/// always address the stored original.
pub fn parse_request(
    config: &Config,
    method: &Method,
    raw_path: &str,
    raw_query: &str,
) -> Result<ImageObject, GatewayError> {
    let path = urlencoding::decode(raw_path)
        .map_err(|_| GatewayError::InvalidRequest(format!("undecodable path '{raw_path}'")))?;

    let trimmed = path.trim_start_matches('/');
    let (bucket_name, rest) = match trimmed.split_once('/') {
        Some((bucket, rest)) => (bucket, format!("/{rest}")),
        None => (trimmed, String::new()),
    };
    if bucket_name.is_empty() {
        return Err(GatewayError::InvalidRequest("missing bucket".to_string()));
    }
    let Some(bucket) = config.buckets.get(bucket_name) else {
        return Err(GatewayError::BucketNotFound(bucket_name.to_string()));
    };

    // Bucket root: listings and location queries, no object identity.
    if rest.is_empty() || rest == "/" {
        return Ok(ImageObject::plain(bucket_name, ""));
    }

    let mut object = if *method == Method::GET || *method == Method::HEAD {
        match bucket.strategy {
            TransformStrategy::Presets => preset::parse(bucket_name, bucket, &rest)
                .unwrap_or_else(|| ImageObject::plain(bucket_name, &rest)),
            TransformStrategy::Query => match query::parse(bucket_name, &rest, raw_query)? {
                Some(derived) => derived,
                None => ImageObject::plain(bucket_name, &rest),
            },
            // Preset first; if the path yields no parent, fall back to the
            // query string.
            TransformStrategy::PresetsQuery => match preset::parse(bucket_name, bucket, &rest) {
                Some(derived) => derived,
                None => match query::parse(bucket_name, &rest, raw_query)? {
                    Some(derived) => derived,
                    None => ImageObject::plain(bucket_name, &rest),
                },
            },
        }
    } else {
        ImageObject::plain(bucket_name, &rest)
    };

    object.check_parent = bucket.check_parent || has_flag(raw_query, "checkParent");
    object.debug = has_flag(raw_query, "debug");
    Ok(object)
}

/// Whether a boolean query flag is present and not explicitly disabled.
fn has_flag(raw_query: &str, name: &str) -> bool {
    url::form_urlencoded::parse(raw_query.as_bytes())
        .any(|(key, value)| key == name && value != "0" && value != "false")
}
