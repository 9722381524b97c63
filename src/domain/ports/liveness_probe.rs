//! LivenessProbe port
//! Time-bounded check that a backend process is alive and responsive

use crate::domain::EgressId;
use async_trait::async_trait;

/// Port for liveness probing
///
/// Implementations are not required to bound themselves; the health
/// monitor wraps every probe in its configured timeout and treats an
/// overrun identically to a negative result.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Probe one backend: process alive and listener responsive
    async fn probe(&self, id: &EgressId, pid: u32, port: u16) -> bool;
}
