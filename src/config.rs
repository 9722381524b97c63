//! Daemon configuration
//! One YAML file carries daemon settings and the desired egress set. The
//! file is re-read on SIGHUP and the supervisor reconciles toward it.

use crate::backends::BinaryPaths;
use crate::domain::{BackendKind, EgressConfig, MonitorConfig, MonitorPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/egressd/config.yaml";

fn default_run_dir() -> PathBuf {
    PathBuf::from("/var/lib/egressd")
}
fn default_stop_timeout() -> u64 {
    crate::domain::constants::DEFAULT_STOP_TIMEOUT_SEC
}
fn default_apply_concurrency() -> usize {
    crate::domain::constants::DEFAULT_APPLY_CONCURRENCY
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Where config artifacts and pidfiles live
    #[serde(default = "default_run_dir")]
    pub run_dir: PathBuf,

    /// Health monitoring policy applied to every backend
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Per-kind monitoring policies; a kind listed here replaces the
    /// global `monitor` policy for backends of that kind
    #[serde(default)]
    pub monitor_overrides: BTreeMap<BackendKind, MonitorConfig>,

    /// Backend executable locations
    #[serde(default)]
    pub binaries: BinaryPaths,

    /// Seconds a backend gets to exit after SIGTERM
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: u64,

    /// Max backends reconciled in parallel during an apply pass
    #[serde(default = "default_apply_concurrency")]
    pub apply_concurrency: usize,

    /// Manage iptables accept rules for backend listen ports
    #[serde(default)]
    pub manage_firewall: bool,

    /// Desired egress set
    #[serde(default)]
    pub egresses: Vec<EgressConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            run_dir: default_run_dir(),
            monitor: MonitorConfig::default(),
            monitor_overrides: BTreeMap::new(),
            binaries: BinaryPaths::default(),
            stop_timeout: default_stop_timeout(),
            apply_concurrency: default_apply_concurrency(),
            manage_firewall: false,
            egresses: Vec::new(),
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        debug!(
            path = %path.display(),
            egresses = config.egresses.len(),
            "Loaded daemon config"
        );
        Ok(config)
    }

    pub fn stop_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.stop_timeout)
    }

    pub fn monitor_policy(&self) -> MonitorPolicy {
        MonitorPolicy {
            default: self.monitor.clone(),
            overrides: self.monitor_overrides.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BackendKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
run_dir: /tmp/egressd
stop_timeout: 5
manage_firewall: true
monitor:
  check_interval: 10
  max_restarts: 5
egresses:
  - id: tokyo-1
    kind: shadowsocks
    params:
      port: "8388"
      password: hunter2
  - id: osaka-1
    kind: snell
    params:
      port: "6160"
      psk: sharedsecret
"#
        )
        .unwrap();

        let config = DaemonConfig::load(file.path()).unwrap();
        assert_eq!(config.run_dir, PathBuf::from("/tmp/egressd"));
        assert_eq!(config.stop_timeout, 5);
        assert!(config.manage_firewall);
        assert_eq!(config.monitor.check_interval, 10);
        assert_eq!(config.monitor.max_restarts, 5);
        assert_eq!(config.egresses.len(), 2);
        assert_eq!(config.egresses[0].kind, BackendKind::Shadowsocks);
        assert_eq!(config.egresses[1].params["psk"], "sharedsecret");
    }

    #[test]
    fn test_monitor_overrides_resolve_per_kind() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
monitor:
  max_restarts: 3
monitor_overrides:
  snell:
    max_restarts: 10
    check_interval: 15
"#
        )
        .unwrap();

        let config = DaemonConfig::load(file.path()).unwrap();
        let policy = config.monitor_policy();
        assert_eq!(policy.resolve(BackendKind::Snell).max_restarts, 10);
        assert_eq!(policy.resolve(BackendKind::Snell).check_interval, 15);
        assert_eq!(policy.resolve(BackendKind::Shadowsocks).max_restarts, 3);
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "egresses: []").unwrap();

        let config = DaemonConfig::load(file.path()).unwrap();
        assert_eq!(config.run_dir, default_run_dir());
        assert_eq!(config.stop_timeout, default_stop_timeout());
        assert!(!config.manage_firewall);
        assert_eq!(config.monitor, MonitorConfig::default());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = DaemonConfig::load(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/config.yaml"));
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "egresses: {{not valid").unwrap();
        assert!(DaemonConfig::load(file.path()).is_err());
    }
}
