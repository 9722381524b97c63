//! Backend adapters, one per supported proxy technology

pub mod common;
pub mod shadowsocks;
pub mod snell;
pub mod trojan;

pub use common::ProcessControl;
pub use shadowsocks::ShadowsocksAdapter;
pub use snell::SnellAdapter;
pub use trojan::TrojanAdapter;

use crate::domain::ports::{AdapterFactory, BackendAdapter, ProcessRunner};
use crate::domain::{BackendKind, EgressConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Where each backend executable lives on the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryPaths {
    #[serde(default = "default_shadowsocks_bin")]
    pub shadowsocks: PathBuf,
    #[serde(default = "default_trojan_bin")]
    pub trojan: PathBuf,
    #[serde(default = "default_snell_bin")]
    pub snell: PathBuf,
}

fn default_shadowsocks_bin() -> PathBuf {
    PathBuf::from("/usr/bin/ssserver")
}
fn default_trojan_bin() -> PathBuf {
    PathBuf::from("/usr/bin/trojan")
}
fn default_snell_bin() -> PathBuf {
    PathBuf::from("/usr/bin/snell-server")
}

impl Default for BinaryPaths {
    fn default() -> Self {
        Self {
            shadowsocks: default_shadowsocks_bin(),
            trojan: default_trojan_bin(),
            snell: default_snell_bin(),
        }
    }
}

impl BinaryPaths {
    pub fn for_kind(&self, kind: BackendKind) -> &PathBuf {
        match kind {
            BackendKind::Shadowsocks => &self.shadowsocks,
            BackendKind::Trojan => &self.trojan,
            BackendKind::Snell => &self.snell,
        }
    }
}

/// Builds the concrete adapter for an egress
///
/// The one place backend kinds are dispatched; the supervisor only ever
/// sees `dyn BackendAdapter`.
pub struct ProxyAdapterFactory {
    runner: Arc<dyn ProcessRunner>,
    run_dir: PathBuf,
    binaries: BinaryPaths,
    stop_timeout: Duration,
}

impl ProxyAdapterFactory {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        run_dir: PathBuf,
        binaries: BinaryPaths,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            run_dir,
            binaries,
            stop_timeout,
        }
    }

    fn control(&self, config: &EgressConfig, artifact_ext: &str) -> ProcessControl {
        ProcessControl::new(
            Arc::clone(&self.runner),
            self.binaries.for_kind(config.kind).clone(),
            self.run_dir.join(format!("{}.{}", config.id, artifact_ext)),
            self.run_dir.join(format!("{}.pid", config.id)),
            self.stop_timeout,
        )
    }
}

impl AdapterFactory for ProxyAdapterFactory {
    fn create(&self, config: &EgressConfig) -> Arc<dyn BackendAdapter> {
        match config.kind {
            BackendKind::Shadowsocks => {
                Arc::new(ShadowsocksAdapter::new(self.control(config, "json")))
            }
            BackendKind::Trojan => Arc::new(TrojanAdapter::new(self.control(config, "json"))),
            BackendKind::Snell => Arc::new(SnellAdapter::new(self.control(config, "conf"))),
        }
    }
}
