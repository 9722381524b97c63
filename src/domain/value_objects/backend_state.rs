//! BackendState value object
//! Represents the lifecycle state of a managed proxy backend

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of a backend in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BackendState {
    /// Backend binary is not present on the host
    NotInstalled,

    /// Installed but no process is running
    #[default]
    Stopped,

    /// Spawn issued, process not yet confirmed healthy
    Starting,

    /// Process is running and passing liveness probes
    Running,

    /// Consecutive probe failures reached the threshold
    Unhealthy,

    /// Restart denied because the cooldown has not elapsed
    CoolingDown,

    /// Restart budget exhausted; terminal until the window ages a slot out
    Failed,
}

impl BackendState {
    /// Check if a live OS process is expected in this state
    pub fn has_process(&self) -> bool {
        matches!(
            self,
            BackendState::Starting
                | BackendState::Running
                | BackendState::Unhealthy
                | BackendState::CoolingDown
        )
    }

    /// Check if the backend can accept a start request
    pub fn can_start(&self) -> bool {
        matches!(self, BackendState::Stopped | BackendState::Failed)
    }

    /// Validate a state transition
    pub fn can_transition_to(&self, new_state: BackendState) -> bool {
        use BackendState::*;

        match (self, new_state) {
            // Install / uninstall observed externally
            (NotInstalled, Stopped) => true,
            (Stopped, NotInstalled) => true,

            // Normal start path
            (Stopped, Starting) => true,
            (Starting, Running) => true,
            (Starting, Stopped) => true,     // spawn failed or cancelled
            (Starting, CoolingDown) => true, // approved restart failed to spawn

            // Running outcomes
            (Running, Stopped) => true,   // explicit stop or observed exit
            (Running, Unhealthy) => true, // probe threshold reached
            (Running, Starting) => true,  // reconfigure restart

            // Unhealthy resolution
            (Unhealthy, Running) => true,  // single probe success
            (Unhealthy, Starting) => true, // approved restart
            (Unhealthy, CoolingDown) => true,
            (Unhealthy, Stopped) => true, // explicit stop

            // Cooldown resolution
            (CoolingDown, Starting) => true, // cooldown elapsed, restart approved
            (CoolingDown, Running) => true,  // probe recovered on its own
            (CoolingDown, Stopped) => true,

            // Budget exhaustion is reachable from any supervised state
            (Starting | Running | Unhealthy | CoolingDown, Failed) => true,

            // Failed resolution: window aged out or operator reset
            (Failed, Starting) => true,
            (Failed, Stopped) => true,

            // Same state is always allowed
            (a, b) if *a == b => true,

            _ => false,
        }
    }
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendState::NotInstalled => write!(f, "not-installed"),
            BackendState::Stopped => write!(f, "stopped"),
            BackendState::Starting => write!(f, "starting"),
            BackendState::Running => write!(f, "running"),
            BackendState::Unhealthy => write!(f, "unhealthy"),
            BackendState::CoolingDown => write!(f, "cooling-down"),
            BackendState::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_process() {
        assert!(BackendState::Running.has_process());
        assert!(BackendState::Starting.has_process());
        assert!(BackendState::Unhealthy.has_process());
        assert!(!BackendState::Stopped.has_process());
        assert!(!BackendState::Failed.has_process());
        assert!(!BackendState::NotInstalled.has_process());
    }

    #[test]
    fn test_valid_transitions() {
        assert!(BackendState::Stopped.can_transition_to(BackendState::Starting));
        assert!(BackendState::Starting.can_transition_to(BackendState::Running));
        assert!(BackendState::Running.can_transition_to(BackendState::Unhealthy));
        assert!(BackendState::Unhealthy.can_transition_to(BackendState::CoolingDown));
        assert!(BackendState::Unhealthy.can_transition_to(BackendState::Running));
        assert!(BackendState::CoolingDown.can_transition_to(BackendState::Starting));
        assert!(BackendState::Unhealthy.can_transition_to(BackendState::Failed));
        assert!(BackendState::Failed.can_transition_to(BackendState::Starting));
        assert!(BackendState::Failed.can_transition_to(BackendState::Stopped));
    }

    #[test]
    fn test_invalid_transitions() {
        // Must pass through Starting
        assert!(!BackendState::Stopped.can_transition_to(BackendState::Running));
        // NotInstalled has no process to degrade
        assert!(!BackendState::NotInstalled.can_transition_to(BackendState::Unhealthy));
        assert!(!BackendState::NotInstalled.can_transition_to(BackendState::Running));
        // Failed is not reachable from Stopped (no restarts attempted there)
        assert!(!BackendState::Stopped.can_transition_to(BackendState::Failed));
    }

    #[test]
    fn test_display() {
        assert_eq!(BackendState::Running.to_string(), "running");
        assert_eq!(BackendState::CoolingDown.to_string(), "cooling-down");
        assert_eq!(BackendState::NotInstalled.to_string(), "not-installed");
    }

    #[test]
    fn test_default() {
        assert_eq!(BackendState::default(), BackendState::Stopped);
    }
}
