// src/core/tasks/flight_janitor.rs

use crate::core::flight::SingleFlight;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// The interval at which the janitor checks for leaked flight entries.
const JANITOR_INTERVAL: Duration = Duration::from_secs(600); // 10 minutes

/// A task that periodically cleans up stale single-flight table entries to
/// prevent slow memory leaks over time. Owner guards normally remove their
/// entry on drop; the janitor only reaps entries orphaned by aborted tasks.
pub struct FlightJanitorTask {
    flight: Arc<SingleFlight>,
    /// Entries older than this with no live waiters are considered leaked.
    max_age: Duration,
}

impl FlightJanitorTask {
    pub fn new(flight: Arc<SingleFlight>, lock_timeout: Duration) -> Self {
        Self {
            flight,
            max_age: lock_timeout * 2,
        }
    }

    /// Runs the main loop for the flight janitor task.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Single-flight janitor started. Check interval: {:?}",
            JANITOR_INTERVAL
        );
        let mut interval = tokio::time::interval(JANITOR_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = self.flight.purge_stale(self.max_age);
                    if removed > 0 {
                        debug!("Flight janitor removed {removed} stale entries.");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Single-flight janitor shutting down.");
                    return;
                }
            }
        }
    }
}
