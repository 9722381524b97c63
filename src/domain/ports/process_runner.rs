//! ProcessRunner port
//! OS seam for spawning and signalling backend processes

use crate::domain::SupervisorError;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Identity of a freshly spawned process
#[derive(Debug, Clone, Copy)]
pub struct SpawnedProcess {
    pub pid: u32,
    /// Kernel start time (clock ticks since boot) for PID-reuse detection
    pub start_time: Option<u64>,
}

/// Port for low-level process control
///
/// Backend adapters share one runner; tests substitute a mock.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Spawn a detached child in its own process group
    async fn spawn_detached(
        &self,
        binary: &Path,
        args: &[String],
    ) -> Result<SpawnedProcess, SupervisorError>;

    /// Send a signal to the process (or its whole group)
    async fn signal(&self, pid: u32, signal: i32, whole_group: bool)
        -> Result<(), SupervisorError>;

    /// Whether the PID refers to a live process
    async fn is_alive(&self, pid: u32) -> bool;

    /// Kernel start time of a live PID, if the platform exposes it
    async fn proc_start_time(&self, pid: u32) -> Option<u64>;

    /// Wait up to `bound` for the process to exit. Returns true if it
    /// exited within the bound; never blocks longer.
    async fn wait_exit(&self, pid: u32, bound: Duration) -> bool;
}
