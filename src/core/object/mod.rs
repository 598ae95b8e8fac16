// src/core/object/mod.rs

//! The identity of a requested artifact and its parent chain.

mod transforms;

pub use transforms::{Gravity, ImageFormat, Transform, TransformChain};

/// The identity of a requested (possibly derived) image.
///
/// Parsed once per request and immutable afterwards. The request deadline is
/// deliberately not part of the identity; it is passed explicitly to every
/// coordinator operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageObject {
    /// Canonical identity: bucket, path and chain fingerprint. Keys cache
    /// entries and single-flight locks.
    pub key: String,
    pub bucket: String,
    /// Object path inside the bucket; also the storage key on the backend
    /// this object is persisted to.
    pub path: String,
    /// Operations producing this object from its parent. Empty for plain
    /// originals.
    pub transforms: TransformChain,
    /// The object this one is derived from. Chains terminate in an object
    /// with no parent and no transforms.
    pub parent: Option<Box<ImageObject>>,
    /// Whether serving a stored derived artifact requires a successful HEAD
    /// of the chain root first.
    pub check_parent: bool,
    /// Suppresses the placeholder on error so clients see the real failure.
    pub debug: bool,
}

impl ImageObject {
    /// A plain object with no transforms and no parent.
    pub fn plain(bucket: &str, path: &str) -> Self {
        Self {
            key: format!("/{bucket}{path}"),
            bucket: bucket.to_string(),
            path: path.to_string(),
            transforms: TransformChain::default(),
            parent: None,
            check_parent: false,
            debug: false,
        }
    }

    /// A derived object produced by applying `transforms` to `parent`.
    pub fn derived(
        key: String,
        path: String,
        transforms: TransformChain,
        parent: ImageObject,
    ) -> Self {
        Self {
            key,
            bucket: parent.bucket.clone(),
            path,
            transforms,
            parent: Some(Box::new(parent)),
            check_parent: false,
            debug: false,
        }
    }

    pub fn has_transforms(&self) -> bool {
        !self.transforms.is_empty()
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// Identifies requests that target a bucket listing rather than an
    /// object.
    pub fn is_bucket_root(&self) -> bool {
        self.path.is_empty() || self.path == "/"
    }
}
