// src/core/cache/mod.rs

//! Bounded, TTL-keyed in-memory store of cloneable responses.

use crate::core::metrics;
use crate::core::response::Response;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::debug;

struct CacheEntry {
    response: Response,
    expires_at: Instant,
}

/// An LRU + TTL cache of responses.
///
/// Only cloneable (buffered) responses are stored, and every read hands out
/// a fresh clone, so the stored buffer is never exposed to consumers.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl ResponseCache {
    /// Creates a cache bounded to `max_entries` responses.
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).expect("capacity is non-zero");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns a clone of the stored response, if present.
    ///
    /// An expired entry is served anyway when `allow_stale` is set (recorded
    /// as a stale hit); otherwise it is removed and `None` is returned.
    pub fn get(&self, key: &str, allow_stale: bool) -> Option<Response> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let cloned = match entries.get(key) {
            None => return None,
            Some(entry) if entry.expires_at > now => Some((entry.response.try_clone(), false)),
            Some(entry) if allow_stale => Some((entry.response.try_clone(), true)),
            Some(_) => None,
        };

        match cloned {
            Some((Ok(response), stale)) => {
                if stale {
                    metrics::CACHE_STALE_HITS_TOTAL.inc();
                } else {
                    metrics::CACHE_HITS_TOTAL.inc();
                }
                Some(response)
            }
            // Stored entries are always buffered, so a failed clone means the
            // entry is unusable; treat it as absent.
            Some((Err(_), _)) => None,
            None => {
                entries.pop(key);
                None
            }
        }
    }

    /// Stores a clone of `response` under `key` for `ttl`.
    ///
    /// If the response cannot be cloned (its stream was already consumed),
    /// the set is skipped silently and recorded as uncacheable.
    pub fn set(&self, key: &str, response: &Response, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        match response.try_clone() {
            Ok(clone) => {
                let entry = CacheEntry {
                    response: clone,
                    expires_at: Instant::now() + ttl,
                };
                self.entries.lock().put(key.to_string(), entry);
            }
            Err(_) => {
                debug!("Skipping cache write for unclonable response under '{key}'");
                metrics::CACHE_UNCACHEABLE_TOTAL.inc();
            }
        }
    }

    /// Removes a single entry, e.g. after a DELETE on the underlying object.
    pub fn invalidate(&self, key: &str) {
        self.entries.lock().pop(key);
    }

    /// Removes all expired entries. Called by the background sweeper so
    /// never-read expired responses don't linger until LRU pressure.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
