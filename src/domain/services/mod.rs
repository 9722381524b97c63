pub mod health_monitor;
pub mod managed;
pub mod restart_policy;
pub mod supervisor;

pub use health_monitor::HealthMonitor;
pub use managed::ManagedBackend;
pub use restart_policy::{RestartDecision, RestartPolicyEngine};
pub use supervisor::{ApplyOutcome, ApplyReport, BackendSnapshot, Supervisor};
