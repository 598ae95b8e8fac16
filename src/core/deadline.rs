// src/core/deadline.rs

//! A small absolute-deadline value passed explicitly through every
//! coordinator operation.

use std::time::Duration;
use tokio::time::Instant;

/// An absolute point in time after which a request must give up.
///
/// Copyable so it can be handed to every suspended operation without
/// threading a context object through the request identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    /// A deadline at an explicit instant.
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    /// The instant the deadline fires, for `tokio::time::timeout_at`.
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left before the deadline, zero if it already passed.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }
}
