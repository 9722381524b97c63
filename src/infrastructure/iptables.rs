//! iptables firewall adapter
//! Opens and closes backend listen ports by shelling out to iptables.
//! Rules are added idempotently: an existing matching rule is left alone.

use crate::domain::ports::Firewall;
use crate::domain::{EgressId, Result, SupervisorError};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

const IPTABLES: &str = "iptables";
const CHAIN: &str = "INPUT";

pub struct IptablesFirewall;

impl IptablesFirewall {
    pub fn new() -> Self {
        Self
    }

    fn rule_args(op: &str, port: u16) -> Vec<String> {
        vec![
            op.to_string(),
            CHAIN.to_string(),
            "-p".to_string(),
            "tcp".to_string(),
            "--dport".to_string(),
            port.to_string(),
            "-j".to_string(),
            "ACCEPT".to_string(),
        ]
    }

    async fn run(args: &[String]) -> Result<bool> {
        let status = Command::new(IPTABLES)
            .args(args)
            .status()
            .await
            .map_err(|e| SupervisorError::Spawn {
                binary: IPTABLES.to_string(),
                source: e,
            })?;
        Ok(status.success())
    }

    async fn rule_exists(port: u16) -> Result<bool> {
        Self::run(&Self::rule_args("-C", port)).await
    }
}

impl Default for IptablesFirewall {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Firewall for IptablesFirewall {
    async fn open_port(&self, id: &EgressId, port: u16) -> Result<()> {
        if Self::rule_exists(port).await? {
            debug!(id = %id, port = port, "Accept rule already present");
            return Ok(());
        }
        if !Self::run(&Self::rule_args("-A", port)).await? {
            return Err(SupervisorError::Io(std::io::Error::other(format!(
                "iptables refused to add accept rule for port {}",
                port
            ))));
        }
        debug!(id = %id, port = port, "Opened listen port");
        Ok(())
    }

    async fn close_port(&self, id: &EgressId, port: u16) -> Result<()> {
        if !Self::rule_exists(port).await? {
            return Ok(());
        }
        if !Self::run(&Self::rule_args("-D", port)).await? {
            warn!(id = %id, port = port, "Failed to delete accept rule");
            return Err(SupervisorError::Io(std::io::Error::other(format!(
                "iptables refused to delete accept rule for port {}",
                port
            ))));
        }
        debug!(id = %id, port = port, "Closed listen port");
        Ok(())
    }
}
