//! MonitorConfig value object
//! Per-deployment health-monitoring and restart policy

use crate::domain::constants::*;
use crate::domain::value_objects::backend_kind::BackendKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Health-monitoring policy, global or per backend kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Whether health monitoring is active for this backend
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between liveness probes
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Minimum seconds between consecutive restart attempts
    #[serde(default = "default_restart_cooldown")]
    pub restart_cooldown: u64,

    /// Restarts permitted within the trailing 60-minute window
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Seconds a single probe may take before it counts as failed
    #[serde(default = "default_health_timeout")]
    pub health_timeout: u64,

    /// Consecutive probe failures before the backend flips to Unhealthy
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

fn default_enabled() -> bool {
    true
}
fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SEC
}
fn default_restart_cooldown() -> u64 {
    DEFAULT_RESTART_COOLDOWN_SEC
}
fn default_max_restarts() -> u32 {
    DEFAULT_MAX_RESTARTS
}
fn default_health_timeout() -> u64 {
    DEFAULT_HEALTH_TIMEOUT_SEC
}
fn default_unhealthy_threshold() -> u32 {
    DEFAULT_UNHEALTHY_THRESHOLD
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: DEFAULT_CHECK_INTERVAL_SEC,
            restart_cooldown: DEFAULT_RESTART_COOLDOWN_SEC,
            max_restarts: DEFAULT_MAX_RESTARTS,
            health_timeout: DEFAULT_HEALTH_TIMEOUT_SEC,
            unhealthy_threshold: DEFAULT_UNHEALTHY_THRESHOLD,
        }
    }
}

impl MonitorConfig {
    pub fn with_check_interval(mut self, seconds: u64) -> Self {
        self.check_interval = seconds;
        self
    }

    pub fn with_restart_cooldown(mut self, seconds: u64) -> Self {
        self.restart_cooldown = seconds;
        self
    }

    pub fn with_max_restarts(mut self, max: u32) -> Self {
        self.max_restarts = max;
        self
    }

    pub fn with_health_timeout(mut self, seconds: u64) -> Self {
        self.health_timeout = seconds;
        self
    }

    pub fn with_unhealthy_threshold(mut self, failures: u32) -> Self {
        self.unhealthy_threshold = failures;
        self
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_secs(self.restart_cooldown)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout)
    }
}

/// Monitoring policy for a whole deployment: one global default plus
/// optional per-kind overrides. An override replaces the default wholesale
/// for backends of that kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorPolicy {
    #[serde(default)]
    pub default: MonitorConfig,

    #[serde(default)]
    pub overrides: BTreeMap<BackendKind, MonitorConfig>,
}

impl MonitorPolicy {
    pub fn global(default: MonitorConfig) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, kind: BackendKind, config: MonitorConfig) -> Self {
        self.overrides.insert(kind, config);
        self
    }

    pub fn resolve(&self, kind: BackendKind) -> &MonitorConfig {
        self.overrides.get(&kind).unwrap_or(&self.default)
    }
}
