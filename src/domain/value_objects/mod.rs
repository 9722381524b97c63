pub mod backend_kind;
pub mod backend_state;
pub mod egress_config;
pub mod monitor_config;
pub mod restart_history;

pub use backend_kind::BackendKind;
pub use backend_state::BackendState;
pub use egress_config::{EgressConfig, EgressId};
pub use monitor_config::{MonitorConfig, MonitorPolicy};
pub use restart_history::RestartHistory;
