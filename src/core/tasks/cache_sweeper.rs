// src/core/tasks/cache_sweeper.rs

use crate::core::cache::ResponseCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// The interval at which the cache sweeper runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// A task that periodically removes expired response cache entries, so
/// expired responses that are never requested again do not occupy slots
/// until LRU pressure pushes them out.
pub struct CacheSweeperTask {
    cache: Arc<ResponseCache>,
}

impl CacheSweeperTask {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }

    /// Runs the main loop for the cache sweeper task.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Response cache sweeper started. Sweep interval: {:?}",
            SWEEP_INTERVAL
        );
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = self.cache.sweep();
                    if removed > 0 {
                        debug!("Cache sweeper removed {removed} expired entries.");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Response cache sweeper shutting down.");
                    return;
                }
            }
        }
    }
}
