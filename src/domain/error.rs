//! Domain-level errors
//! These represent supervision failures, scoped to a single backend

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    // Configuration errors (fatal to that backend's apply only)
    #[error("Invalid configuration for '{id}': {reason}")]
    InvalidConfig { id: String, reason: String },

    #[error("Backend '{id}' is missing required parameter '{param}'")]
    MissingParameter { id: String, param: String },

    // Lifecycle errors
    #[error("Backend binary '{binary}' is not installed")]
    BinaryMissing { binary: String },

    #[error("Failed to spawn '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Graceful stop of pid {pid} exceeded {timeout:?}, escalated to SIGKILL")]
    StopTimeout { pid: u32, timeout: Duration },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Health / restart gating
    #[error("Liveness probe did not complete within {timeout:?}")]
    HealthCheckTimeout { timeout: Duration },

    #[error("Restart denied: cooldown active, {remaining:?} remaining")]
    CooldownActive { remaining: Duration },

    #[error("Restart budget exhausted, next slot frees in {slot_frees_in:?}")]
    RestartBudgetExceeded { slot_frees_in: Duration },

    // Lookup
    #[error("Backend '{0}' not found")]
    BackendNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
