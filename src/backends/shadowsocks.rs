//! Shadowsocks backend adapter
//! Drives an `ssserver` process with a rendered JSON config.

use crate::backends::common::ProcessControl;
use crate::domain::ports::{BackendAdapter, BackendStatus, StartOutcome};
use crate::domain::{EgressConfig, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use tracing::warn;

const DEFAULT_METHOD: &str = "chacha20-ietf-poly1305";

/// On-disk shape of the ssserver config file. Field order is fixed by the
/// struct, so rendering is deterministic for fingerprint comparison.
#[derive(Serialize)]
struct ServerConfig<'a> {
    server: &'a str,
    server_port: u16,
    password: &'a str,
    method: &'a str,
    mode: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
}

pub struct ShadowsocksAdapter {
    control: ProcessControl,
}

impl ShadowsocksAdapter {
    pub fn new(control: ProcessControl) -> Self {
        Self { control }
    }

    fn args(&self) -> Vec<String> {
        vec![
            "-c".to_string(),
            self.control.config_path().display().to_string(),
        ]
    }
}

#[async_trait]
impl BackendAdapter for ShadowsocksAdapter {
    async fn configure(&self, config: &EgressConfig) -> Result<()> {
        let rendered = ServerConfig {
            server: config.params.get("bind").map(String::as_str).unwrap_or("0.0.0.0"),
            server_port: config.listen_port()?,
            password: config.require("password")?,
            method: config
                .params
                .get("method")
                .map(String::as_str)
                .unwrap_or(DEFAULT_METHOD),
            mode: config
                .params
                .get("mode")
                .map(String::as_str)
                .unwrap_or("tcp_and_udp"),
            timeout: config.params.get("timeout").and_then(|t| t.parse().ok()),
        };
        let body = serde_json::to_vec_pretty(&rendered).map_err(std::io::Error::from)?;
        self.control.write_config(&body).await
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
