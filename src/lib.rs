//! egressd: supervisor for pluggable proxy egress backends
//!
//! Reconciles a desired set of egress endpoints (shadowsocks, trojan,
//! snell) against the processes actually running on the host, keeps them
//! healthy with per-backend liveness probes, and rate-limits crash-loop
//! restarts with a cooldown plus a rolling one-hour budget.

pub mod backends;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::DaemonConfig;
pub use domain::services::{ApplyOutcome, ApplyReport, HealthMonitor, Supervisor};
pub use domain::{
    Backend, BackendKind, BackendState, EgressConfig, EgressId, MonitorConfig, MonitorPolicy,
    Result, SupervisorError,
};
