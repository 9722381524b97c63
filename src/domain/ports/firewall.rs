//! Firewall port
//! Open/close signal emitted when a backend enters or leaves Running

use crate::domain::{EgressId, SupervisorError};
use async_trait::async_trait;

#[async_trait]
pub trait Firewall: Send + Sync {
    async fn open_port(&self, id: &EgressId, port: u16) -> Result<(), SupervisorError>;

    async fn close_port(&self, id: &EgressId, port: u16) -> Result<(), SupervisorError>;
}

/// No-op firewall for deployments that manage perimeter rules elsewhere
pub struct NullFirewall;

#[async_trait]
impl Firewall for NullFirewall {
    async fn open_port(&self, _id: &EgressId, _port: u16) -> Result<(), SupervisorError> {
        Ok(())
    }

    async fn close_port(&self, _id: &EgressId, _port: u16) -> Result<(), SupervisorError> {
        Ok(())
    }
}
