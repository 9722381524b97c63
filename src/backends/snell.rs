//! Snell backend adapter
//! Drives a `snell-server` process. Snell takes an INI-style config
//! rather than JSON, rendered by hand with a fixed key order.

use crate::backends::common::ProcessControl;
use crate::domain::ports::{BackendAdapter, BackendStatus, StartOutcome};
use crate::domain::{EgressConfig, Result};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::Path;
use tracing::warn;

pub struct SnellAdapter {
    control: ProcessControl,
}

impl SnellAdapter {
    pub fn new(control: ProcessControl) -> Self {
        Self { control }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-c".to_string(),
            self.control.config_path().display().to_string(),
        ]
    }

    fn render(config: &EgressConfig) -> Result<String> {
        let bind = config.params.get("bind").map(String::as_str).unwrap_or("0.0.0.0");
        let port = config.listen_port()?;
        let psk = config.require("psk")?;

        let mut out = String::new();
        let _ = writeln!(out, "[snell]");
        let _ = writeln!(out, "listen = {}:{}", bind, port);
        let _ = writeln!(out, "psk = {}", psk);
        if let Some(obfs) = config.params.get("obfs") {
            let _ = writeln!(out, "obfs = {}", obfs);
        }
        if let Some(ipv6) = config.params.get("ipv6") {
            let _ = writeln!(out, "ipv6 = {}", ipv6);
        }
        Ok(out)
    }
}

#[async_trait]
impl BackendAdapter for SnellAdapter {
    async fn configure(&self, config: &EgressConfig) -> Result<()> {
        let body = Self::render(config)?;
        self.control.write_config(body.as_bytes()).await
    }

    async fn start(&self) -> Result<StartOutcome> {
        self.control.start(&self.args()).await
    }

    async fn stop(&self) -> Result<()> {
        self.control.stop().await
    }

    async fn restart(&self) -> Result<StartOutcome> {
        if let Err(e) = self.control.stop().await {
            warn!(error = %e, "Stop during restart failed, spawning anyway");
        }
        self.control.start(&self.args()).await
    }

    async fn status(&self) -> BackendStatus {
        BackendStatus {
            installed: self.control.is_installed().await,
            running: self.control.is_running().await,
            pid: self.control.current_pid().await,
        }
    }

    async fn is_installed(&self) -> bool {
        self.control.is_installed().await
    }

    async fn is_running(&self) -> bool {
        self.control.is_running().await
    }

    fn binary_path(&self) -> &Path {
        self.control.binary_path()
    }
}
