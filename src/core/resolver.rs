// src/core/resolver.rs

//! Walks derived-to-parent chains and fetches chain roots.

use crate::core::deadline::Deadline;
use crate::core::errors::GatewayError;
use crate::core::object::{ImageObject, Transform};
use crate::core::response::Response;
use crate::core::storage::Storage;
use std::sync::Arc;

/// Upper bound on parent chain length. Chains are built by the URL parser
/// and are short in practice; the limit guards against malformed input.
const MAX_CHAIN_DEPTH: usize = 8;

/// Resolves a derived object to its chain root and the transform stack.
///
/// The chain is declared child-first, but transforms must be applied
/// parent-to-child on the root bytes, so the accumulated per-node lists are
/// reversed before flattening.
pub fn resolve(object: &ImageObject) -> Result<(ImageObject, Vec<Transform>), GatewayError> {
    let mut per_node: Vec<&[Transform]> = Vec::new();
    let mut node = object;
    let mut hops = 0;

    loop {
        if !node.transforms.is_empty() {
            per_node.push(node.transforms.as_slice());
        }
        match &node.parent {
            Some(parent) => {
                hops += 1;
                if hops > MAX_CHAIN_DEPTH {
                    return Err(GatewayError::InvalidRequest(format!(
                        "parent chain deeper than {MAX_CHAIN_DEPTH} for '{}'",
                        object.key
                    )));
                }
                node = parent;
            }
            None => break,
        }
    }

    per_node.reverse();
    let transforms = per_node.into_iter().flatten().cloned().collect();
    Ok((node.clone(), transforms))
}

/// GETs the chain root within the deadline. The body is buffered because the
/// engine consumes it as a whole.
pub async fn fetch_root(
    storage: &Arc<dyn Storage>,
    root: &ImageObject,
    deadline: Deadline,
) -> Result<Response, GatewayError> {
    let response = tokio::time::timeout_at(deadline.instant(), storage.get(&root.path))
        .await
        .map_err(|_| GatewayError::Timeout)?;
    response.into_buffered().await
}

/// HEADs the chain root within the deadline.
pub async fn head_root(
    storage: &Arc<dyn Storage>,
    root: &ImageObject,
    deadline: Deadline,
) -> Result<Response, GatewayError> {
    tokio::time::timeout_at(deadline.instant(), storage.head(&root.path))
        .await
        .map_err(|_| GatewayError::Timeout)
}
