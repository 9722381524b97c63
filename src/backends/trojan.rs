//! Trojan backend adapter
//! Drives a `trojan` server process. Trojan fronts as TLS, so a cert and
//! key path are mandatory parameters.

use crate::backends::common::ProcessControl;
use crate::domain::ports::{BackendAdapter, BackendStatus, StartOutcome};
use crate::domain::{EgressConfig, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use tracing::warn;

#[derive(Serialize)]
struct SslConfig<'a> {
    cert: &'a str,
    key: &'a str,
}

#[derive(Serialize)]
struct ServerConfig<'a> {
    run_type: &'a str,
    local_addr: &'a str,
    local_port: u16,
    remote_addr: &'a str,
    remote_port: u16,
    password: Vec<&'a str>,
    ssl: SslConfig<'a>,
}

pub struct TrojanAdapter {
    control: ProcessControl,
}

impl TrojanAdapter {
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
impl BackendAdapter for TrojanAdapter {
    async fn configure(&self, config: &EgressConfig) -> Result<()> {
        let rendered = ServerConfig {
            run_type: "server",
            local_addr: config.params.get("bind").map(String::as_str).unwrap_or("0.0.0.0"),
            local_port: config.listen_port()?,
            // Unauthenticated probes get proxied to the decoy upstream
            remote_addr: config
                .params
                .get("fallback_addr")
                .map(String::as_str)
                .unwrap_or("127.0.0.1"),
            remote_port: config
                .params
                .get("fallback_port")
                .and_then(|p| p.parse().ok())
                .unwrap_or(80),
            password: vec![config.require("password")?],
            ssl: SslConfig {
                cert: config.require("cert")?,
                key: config.require("key")?,
            },
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MockProcessRunner;
    use crate::domain::{BackendKind, SupervisorError};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn adapter(dir: &TempDir) -> TrojanAdapter {
        TrojanAdapter::new(ProcessControl::new(
            Arc::new(MockProcessRunner::new()),
            PathBuf::from("/usr/bin/trojan"),
            dir.path().join("egress-1.json"),
            dir.path().join("egress-1.pid"),
            Duration::from_millis(50),
        ))
    }

    fn config() -> EgressConfig {
        EgressConfig::new("egress-1", BackendKind::Trojan)
            .with_param("port", "443")
            .with_param("password", "hunter2")
            .with_param("cert", "/etc/ssl/egress.crt")
            .with_param("key", "/etc/ssl/egress.key")
    }

    #[tokio::test]
    async fn test_configure_renders_server_config() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir);

        adapter.configure(&config()).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("egress-1.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["run_type"], "server");
        assert_eq!(parsed["local_port"], 443);
        assert_eq!(parsed["password"][0], "hunter2");
        assert_eq!(parsed["ssl"]["cert"], "/etc/ssl/egress.crt");
        assert_eq!(parsed["remote_port"], 80);
    }

    #[tokio::test]
    async fn test_configure_requires_tls_material() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir);
        let mut incomplete = config();
        incomplete.params.remove("key");

        let err = adapter.configure(&incomplete).await.unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::MissingParameter { ref param, .. } if param == "key"
        ));
    }
}
