//! Structured lifecycle events
//! Every supervision decision is emitted as a tracing event with a stable
//! `event` field so log consumers can filter without parsing messages.

use crate::domain::{BackendState, EgressId};
use std::time::Duration;
use tracing::{info, warn};

pub fn startup(backend_count: usize) {
    info!(event = "startup", backends = backend_count, "Supervisor started");
}

pub fn shutdown(reason: &str) {
    info!(event = "shutdown", reason = reason, "Supervisor shutting down");
}

pub fn state_change(id: &EgressId, prev: BackendState, next: BackendState, reason: &str) {
    info!(
        event = "state_change",
        id = %id,
        prev = %prev,
        next = %next,
        reason = reason,
        "Backend state changed"
    );
}

pub fn restart_attempt(id: &EgressId, in_window: usize) {
    info!(
        event = "restart_attempt",
        id = %id,
        restarts_in_window = in_window,
        "Restart approved"
    );
}

pub fn restart_denied(id: &EgressId, reason: &str, retry_after: Option<Duration>) {
    warn!(
        event = "restart_denied",
        id = %id,
        reason = reason,
        retry_after_secs = retry_after.map(|d| d.as_secs()),
        "Restart denied"
    );
}

pub fn failure(id: &EgressId, error: &dyn std::fmt::Display) {
    warn!(event = "failure", id = %id, error = %error, "Backend failure");
}
