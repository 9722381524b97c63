//! TCP liveness probe
//! A backend is healthy when its process is alive and its listen port
//! accepts a TCP connection. The monitor bounds the whole probe with the
//! configured health timeout, so no inner timeout is needed here.

use crate::domain::ports::{LivenessProbe, ProcessRunner};
use crate::domain::EgressId;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::debug;

pub struct TcpLivenessProbe {
    runner: Arc<dyn ProcessRunner>,
}

impl TcpLivenessProbe {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl LivenessProbe for TcpLivenessProbe {
    async fn probe(&self, id: &EgressId, pid: u32, port: u16) -> bool {
        if !self.runner.is_alive(pid).await {
            debug!(id = %id, pid = pid, "Probe failed: process not alive");
            return false;
        }
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(_) => true,
            Err(e) => {
                debug!(id = %id, port = port, error = %e, "Probe failed: connect refused");
                false
            }
        }
    }
}
