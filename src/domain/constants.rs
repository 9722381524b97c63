//! Policy defaults shared across the domain

use std::time::Duration;

/// Trailing window for restart rate limiting.
pub const RESTART_WINDOW: Duration = Duration::from_secs(3600);

/// Seconds between liveness probes.
pub const DEFAULT_CHECK_INTERVAL_SEC: u64 = 30;

/// Minimum gap between consecutive restart attempts of one backend.
pub const DEFAULT_RESTART_COOLDOWN_SEC: u64 = 60;

/// Restarts permitted per backend within [`RESTART_WINDOW`].
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

/// Bound on a single liveness probe.
pub const DEFAULT_HEALTH_TIMEOUT_SEC: u64 = 5;

/// Consecutive probe failures before a backend is considered unhealthy.
pub const DEFAULT_UNHEALTHY_THRESHOLD: u32 = 2;

/// Graceful-termination wait before escalating to SIGKILL.
pub const DEFAULT_STOP_TIMEOUT_SEC: u64 = 10;

/// Bound on concurrent per-backend operations during a batch apply.
pub const DEFAULT_APPLY_CONCURRENCY: usize = 4;
