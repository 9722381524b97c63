//! BackendAdapter port
//! One implementation per proxy technology; the supervisor and policy
//! engine only ever see this interface.

use crate::domain::{EgressConfig, SupervisorError};
use async_trait::async_trait;
use std::sync::Arc;

/// Result of a successful spawn
#[derive(Debug, Clone, Copy)]
pub struct StartOutcome {
    pub pid: u32,
    /// Kernel start time of the spawned PID, when the platform exposes it
    pub proc_start_time: Option<u64>,
}

/// Read-only snapshot of a backend's on-host status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendStatus {
    pub installed: bool,
    pub running: bool,
    pub pid: Option<u32>,
}

/// Capability set every proxy technology must provide
///
/// `configure` must be deterministic: identical logical parameters always
/// produce a byte-identical artifact, so fingerprint comparison is a sound
/// change detector. Read-only queries (`status`, `is_installed`,
/// `is_running`) have no side effects.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Render and persist the backend-native config artifact
    async fn configure(&self, config: &EgressConfig) -> Result<(), SupervisorError>;

    /// Spawn the backend process; no-op success if already running
    async fn start(&self) -> Result<StartOutcome, SupervisorError>;

    /// Gracefully stop the backend, escalating on timeout; no-op success
    /// if no process is recorded. Never blocks past its bound.
    async fn stop(&self) -> Result<(), SupervisorError>;

    /// Stop followed by start; stop failures are logged, not propagated
    async fn restart(&self) -> Result<StartOutcome, SupervisorError>;

    /// Combined read-only status query
    async fn status(&self) -> BackendStatus;

    /// Whether the backend executable is present on the host
    async fn is_installed(&self) -> bool;

    /// Whether a live process is currently associated with this backend
    async fn is_running(&self) -> bool;

    /// Path of the backend executable this adapter would spawn
    fn binary_path(&self) -> &std::path::Path;
}

/// Creates the adapter for an egress; the only place backend kinds are
/// dispatched, so adding a technology never touches the supervisor.
pub trait AdapterFactory: Send + Sync {
    fn create(&self, config: &EgressConfig) -> Arc<dyn BackendAdapter>;
}
