pub mod backend_adapter;
pub mod firewall;
pub mod liveness_probe;
pub mod mock_runner;
pub mod process_runner;

pub use backend_adapter::{AdapterFactory, BackendAdapter, BackendStatus, StartOutcome};
pub use firewall::{Firewall, NullFirewall};
pub use liveness_probe::LivenessProbe;
pub use mock_runner::MockProcessRunner;
pub use process_runner::{ProcessRunner, SpawnedProcess};
