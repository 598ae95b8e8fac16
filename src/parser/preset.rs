// src/parser/preset.rs

//! Preset strategy: a named, server-side-defined transform chain selected
//! by the first path segment after the bucket.

use crate::config::BucketConfig;
use crate::core::object::{ImageObject, TransformChain};

/// Parses `/{preset}/{rest}` against the bucket's preset table.
///
/// The derived object is keyed by the request path itself, so preset URLs
/// are stable storage keys; the parent is the original at `/{rest}`.
pub fn parse(bucket_name: &str, bucket: &BucketConfig, rest: &str) -> Option<ImageObject> {
    let trimmed = rest.trim_start_matches('/');
    let (preset_name, object_path) = trimmed.split_once('/')?;
    if object_path.is_empty() {
        return None;
    }
    let preset = bucket.presets.get(preset_name)?;

    let parent = ImageObject::plain(bucket_name, &format!("/{object_path}"));
    let derived_path = format!("/{preset_name}/{object_path}");
    let key = format!("/{bucket_name}{derived_path}");
    Some(ImageObject::derived(
        key,
        derived_path,
        TransformChain::new(preset.operations.clone()),
        parent,
    ))
}
