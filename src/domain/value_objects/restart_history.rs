//! RestartHistory value object
//! Sliding-window record of approved restart timestamps for one backend

use crate::domain::constants::RESTART_WINDOW;
use std::time::{Duration, Instant};

/// Ordered restart timestamps retained within a trailing 60-minute window
///
/// Pruning is lazy: entries older than the window are dropped at every
/// decision point, relative to the decision time rather than any fixed
/// clock alignment.
#[derive(Debug, Clone, Default)]
pub struct RestartHistory {
    entries: Vec<Instant>,
}

impl RestartHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries older than the window, relative to `now`
    pub fn prune(&mut self, now: Instant) {
        self.entries
            .retain(|t| now.duration_since(*t) < RESTART_WINDOW);
    }

    /// Record an approved restart at `now`
    pub fn record(&mut self, now: Instant) {
        self.entries.push(now);
    }

    /// In-window restart count (callers prune first)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timestamp of the most recent restart, if any
    pub fn last_restart(&self) -> Option<Instant> {
        self.entries.last().copied()
    }

    /// Time until the oldest in-window entry ages out, freeing a slot
    pub fn time_until_slot_free(&self, now: Instant) -> Option<Duration> {
        self.entries
            .first()
            .map(|oldest| RESTART_WINDOW.saturating_sub(now.duration_since(*oldest)))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
