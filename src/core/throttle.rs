// src/core/throttle.rs

//! Bounded semaphore gating concurrent image processing.

use crate::core::deadline::Deadline;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Limits the number of engine invocations running at once.
///
/// Only the processing step is throttled; cache and storage lookups are not.
pub struct Throttler {
    semaphore: Arc<Semaphore>,
}

/// An acquired processing slot. Dropping it releases the slot on all paths.
pub struct ThrottlePermit {
    _permit: OwnedSemaphorePermit,
}

impl Throttler {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity.max(1))),
        }
    }

    /// Waits for a permit until the deadline elapses.
    pub async fn acquire(&self, deadline: Deadline) -> Option<ThrottlePermit> {
        let acquired = tokio::time::timeout_at(
            deadline.instant(),
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await;
        match acquired {
            Ok(Ok(permit)) => Some(ThrottlePermit { _permit: permit }),
            // The semaphore is never closed; a closed error means shutdown,
            // which callers treat the same as a missed deadline.
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Permits currently available, used by tests and metrics.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
