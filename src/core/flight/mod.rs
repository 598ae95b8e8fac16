// src/core/flight/mod.rs

//! Per-key single-flight coordination with broadcast of the computed result.

use crate::core::response::Response;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

type FlightTable = Arc<Mutex<HashMap<String, FlightEntry>>>;

struct FlightEntry {
    created_at: Instant,
    next_waiter_id: u64,
    waiters: Vec<Waiter>,
}

struct Waiter {
    id: u64,
    tx: mpsc::Sender<Response>,
}

/// The outcome of registering intent for a key: the first caller owns the
/// computation, everyone else waits for its broadcast.
pub enum Flight {
    Owner(OwnerGuard),
    Waiter(FlightTicket),
}

/// Collapses concurrent identical work into one computation.
///
/// The table is guarded by a single mutex covering the map and all waiter
/// membership changes; channel sends happen outside the lock and are
/// non-blocking, so a waiter that cancelled or timed out is simply skipped.
/// No fairness among waiters is guaranteed.
pub struct SingleFlight {
    table: FlightTable,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Atomically registers intent for `key`.
    pub fn acquire(&self, key: &str) -> Flight {
        let mut table = self.table.lock();
        match table.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(FlightEntry {
                    created_at: Instant::now(),
                    next_waiter_id: 0,
                    waiters: Vec::new(),
                });
                Flight::Owner(OwnerGuard {
                    key: key.to_string(),
                    table: Arc::clone(&self.table),
                    done: false,
                })
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let (tx, rx) = mpsc::channel(1);
                let id = entry.next_waiter_id;
                entry.next_waiter_id += 1;
                entry.waiters.push(Waiter { id, tx });
                Flight::Waiter(FlightTicket {
                    key: key.to_string(),
                    id,
                    rx,
                    table: Arc::clone(&self.table),
                })
            }
        }
    }

    /// Drops entries older than `max_age` whose waiters have all gone away.
    ///
    /// Owner guards remove their entry on drop, so this only reaps entries
    /// leaked by an aborted owner task. Returns the number removed.
    pub fn purge_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut table = self.table.lock();
        let before = table.len();
        table.retain(|key, entry| {
            let stale = now.saturating_duration_since(entry.created_at) > max_age
                && entry.waiters.iter().all(|w| w.tx.is_closed());
            if stale {
                debug!("Purging stale single-flight entry for '{key}'");
            }
            !stale
        });
        before - table.len()
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}

/// The owner's handle on an in-flight key.
///
/// Publishing broadcasts a clone of the result to every current waiter and
/// removes the key. Dropping the guard without publishing releases the key;
/// waiters observe their channel closing and recompute independently, so an
/// owner that errors or panics can never strand them.
pub struct OwnerGuard {
    key: String,
    table: FlightTable,
    done: bool,
}

impl OwnerGuard {
    /// Broadcasts `response` to all current waiters and removes the key.
    pub fn publish(mut self, response: &Response) {
        let waiters = self
            .table
            .lock()
            .remove(&self.key)
            .map(|entry| entry.waiters)
            .unwrap_or_default();
        self.done = true;

        for waiter in waiters {
            match response.try_clone() {
                // Non-blocking: a waiter whose buffer is full or whose
                // receiver is gone has cancelled or timed out.
                Ok(clone) => {
                    let _ = waiter.tx.try_send(clone);
                }
                Err(_) => {
                    // Unclonable result: dropping the sender closes the
                    // waiter's channel and it falls back on its own.
                }
            }
        }
    }
}

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        if !self.done {
            // Release without a result: waiter channels close.
            self.table.lock().remove(&self.key);
        }
    }
}

/// A waiter's subscription to an owner's broadcast.
pub struct FlightTicket {
    key: String,
    id: u64,
    rx: mpsc::Receiver<Response>,
    table: FlightTable,
}

impl FlightTicket {
    /// Waits for the owner's broadcast. `None` means the owner released the
    /// key without publishing and the waiter must compute on its own.
    pub async fn recv(&mut self) -> Option<Response> {
        self.rx.recv().await
    }

    /// Non-blocking probe of the broadcast channel.
    pub fn try_recv(&mut self) -> Option<Response> {
        self.rx.try_recv().ok()
    }

    /// Withdraws from the broadcast set so the owner never attempts delivery
    /// to this waiter.
    pub fn cancel(self) {
        let mut table = self.table.lock();
        if let Some(entry) = table.get_mut(&self.key) {
            entry.waiters.retain(|w| w.id != self.id);
        }
    }
}
