//! Backend entity
//! Durable record of one backend's OS process identity and health state.
//! Owned exclusively by the supervisor entry for its egress id; the OS
//! holds the actual process.

use crate::domain::{BackendKind, BackendState, EgressId, SupervisorError};
use std::time::{Instant, SystemTime};

/// Per-backend process record and lifecycle state
#[derive(Debug, Clone)]
pub struct Backend {
    id: EgressId,
    kind: BackendKind,
    state: BackendState,

    // Process identity
    pid: Option<u32>,
    /// Kernel start time of the recorded PID (clock ticks since boot),
    /// used to detect PID reuse when re-validating a durable record.
    proc_start_time: Option<u64>,
    started_at: Option<SystemTime>,

    /// Fingerprint of the last configuration applied to disk
    fingerprint: Option<String>,

    // Health bookkeeping
    last_check_at: Option<Instant>,
    last_check_healthy: Option<bool>,
    consecutive_failures: u32,
}

impl Backend {
    pub fn new(id: EgressId, kind: BackendKind) -> Self {
        Self {
            id,
            kind,
            state: BackendState::Stopped,
            pid: None,
            proc_start_time: None,
            started_at: None,
            fingerprint: None,
            last_check_at: None,
            last_check_healthy: None,
            consecutive_failures: 0,
        }
    }

    // ===== Getters =====

    pub fn id(&self) -> &EgressId {
        &self.id
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn state(&self) -> BackendState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn proc_start_time(&self) -> Option<u64> {
        self.proc_start_time
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.started_at
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn last_check_at(&self) -> Option<Instant> {
        self.last_check_at
    }

    pub fn last_check_healthy(&self) -> Option<bool> {
        self.last_check_healthy
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    // ===== Configuration =====

    pub fn set_fingerprint(&mut self, fingerprint: String) {
        self.fingerprint = Some(fingerprint);
    }

    /// True if `fingerprint` differs from the last applied configuration
    pub fn fingerprint_differs(&self, fingerprint: &str) -> bool {
        self.fingerprint.as_deref() != Some(fingerprint)
    }

    // ===== State transitions =====

    fn transition(&mut self, to: BackendState) -> Result<(), SupervisorError> {
        if !self.state.can_transition_to(to) {
            return Err(SupervisorError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }

    pub fn mark_not_installed(&mut self) -> Result<(), SupervisorError> {
        self.transition(BackendState::NotInstalled)?;
        self.clear_process();
        Ok(())
    }

    pub fn mark_installed(&mut self) -> Result<(), SupervisorError> {
        self.transition(BackendState::Stopped)
    }

    pub fn mark_starting(&mut self) -> Result<(), SupervisorError> {
        self.transition(BackendState::Starting)
    }

    pub fn mark_running(&mut self, pid: u32, proc_start_time: Option<u64>) -> Result<(), SupervisorError> {
        self.transition(BackendState::Running)?;
        self.pid = Some(pid);
        self.proc_start_time = proc_start_time;
        self.started_at = Some(SystemTime::now());
        self.consecutive_failures = 0;
        Ok(())
    }

    pub fn mark_stopped(&mut self) -> Result<(), SupervisorError> {
        self.transition(BackendState::Stopped)?;
        self.clear_process();
        Ok(())
    }

    pub fn mark_unhealthy(&mut self) -> Result<(), SupervisorError> {
        self.transition(BackendState::Unhealthy)
    }

    pub fn mark_cooling_down(&mut self) -> Result<(), SupervisorError> {
        self.transition(BackendState::CoolingDown)
    }

    pub fn mark_failed(&mut self) -> Result<(), SupervisorError> {
        self.transition(BackendState::Failed)?;
        self.clear_process();
        Ok(())
    }

    /// Single probe success while degraded returns the backend to Running
    pub fn mark_recovered(&mut self) -> Result<(), SupervisorError> {
        self.transition(BackendState::Running)?;
        self.consecutive_failures = 0;
        Ok(())
    }

    fn clear_process(&mut self) {
        self.pid = None;
        self.proc_start_time = None;
        self.started_at = None;
        self.consecutive_failures = 0;
    }

    // ===== Health bookkeeping =====

    /// Record one probe outcome; returns the consecutive-failure count
    pub fn record_check(&mut self, healthy: bool, at: Instant) -> u32 {
        self.last_check_at = Some(at);
        self.last_check_healthy = Some(healthy);
        if healthy {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
        self.consecutive_failures
    }
}
