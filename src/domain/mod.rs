//! Domain layer: entities, value objects, ports, and services for
//! supervising proxy backend processes.

pub mod constants;
pub mod entities;
pub mod error;
pub mod events;
pub mod ports;
pub mod services;
pub mod value_objects;

pub use entities::Backend;
pub use error::{Result, SupervisorError};
pub use value_objects::{
    BackendKind, BackendState, EgressConfig, EgressId, MonitorConfig, MonitorPolicy,
    RestartHistory,
};
